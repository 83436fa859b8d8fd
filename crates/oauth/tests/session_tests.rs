#![allow(clippy::unwrap_used, clippy::expect_used)]
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    mockito::{Matcher, Mock, ServerGuard},
    serde_json::json,
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        sync::Notify,
    },
    url::Url,
    wicket_oauth::{
        AuthEvent, AuthSession, AuthState, ClientConfig, DurableStore, KeyValueStore, Location,
        MemoryLocation, MemoryStore, OidcConfig, PendingAuthorization, PendingStore,
        RecordingNavigator, ReplayStore, pkce::challenge_for, types::now_secs,
    },
};

const APP: &str = "https://app.example/";

fn jwt(claims: serde_json::Value) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes())
    )
}

fn id_token(sub: &str, lifetime_secs: u64) -> String {
    jwt(json!({ "sub": sub, "exp": now_secs() + lifetime_secs }))
}

async fn provider() -> (ServerGuard, Mock) {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let discovery = server
        .mock("GET", "/.well-known/openid-configuration")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/auth"),
                "token_endpoint": format!("{base}/token"),
                "revocation_endpoint": format!("{base}/revoke"),
            })
            .to_string(),
        )
        .create_async()
        .await;
    (server, discovery)
}

fn token_body(access: &str, refresh: Option<&str>, id_token: Option<String>) -> String {
    let mut body = json!({ "access_token": access, "token_type": "Bearer", "expires_in": 300 });
    if let Some(refresh) = refresh {
        body["refresh_token"] = json!(refresh);
    }
    if let Some(id_token) = id_token {
        body["id_token"] = json!(id_token);
    }
    body.to_string()
}

fn config(server: &ServerGuard) -> OidcConfig {
    OidcConfig::new(server.url(), ClientConfig::new("app"))
}

struct Harness {
    session: AuthSession,
    location: Arc<MemoryLocation>,
    navigator: Arc<RecordingNavigator>,
    events: Events,
}

fn durable(config: OidcConfig, href: &str, backend: Arc<MemoryStore>) -> Harness {
    let location = Arc::new(MemoryLocation::new(href));
    let store = Arc::new(DurableStore::new(backend));
    harness(config, location, store)
}

fn harness(
    config: OidcConfig,
    location: Arc<MemoryLocation>,
    store: Arc<dyn PendingStore>,
) -> Harness {
    let navigator = Arc::new(RecordingNavigator::new());
    let session = AuthSession::new(config, location.clone(), navigator.clone(), store).unwrap();
    let events = Events::attach(&session);
    Harness {
        session,
        location,
        navigator,
        events,
    }
}

fn backend_with(state: &str, verifier: Option<&str>) -> Arc<MemoryStore> {
    let backend = Arc::new(MemoryStore::new());
    DurableStore::new(backend.clone())
        .save(&PendingAuthorization::new(state, verifier.map(str::to_string)))
        .unwrap();
    backend
}

#[derive(Clone, Default)]
struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    fn attach(session: &AuthSession) -> Self {
        let events = Self::default();
        let sink = events.clone();
        session.on_event(move |event| {
            let line = match event {
                AuthEvent::AccessToken(Some(token)) => format!("access:{token}"),
                AuthEvent::AccessToken(None) => "access:none".to_string(),
                AuthEvent::IdToken { claims, .. } => format!(
                    "id:{}",
                    claims.as_ref().and_then(|c| c.subject()).unwrap_or("?")
                ),
                AuthEvent::Logout => "logout".to_string(),
                AuthEvent::Error(e) => format!("error:{e}"),
            };
            sink.0.lock().unwrap().push(line);
        });
        events
    }

    fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn errors(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|e| e.starts_with("error:"))
            .collect()
    }

    async fn wait_for(&self, prefix: &str, count: usize) {
        for _ in 0..200 {
            if self.all().iter().filter(|e| e.starts_with(prefix)).count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("timed out waiting for {count} x {prefix}: {:?}", self.all());
    }
}

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

#[tokio::test]
async fn durable_redirect_exchanges_code_with_verifier() {
    let (mut server, _discovery) = provider().await;
    let token = server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "abc".into()),
            Matcher::UrlEncoded("code_verifier".into(), "v1".into()),
            Matcher::UrlEncoded("redirect_uri".into(), APP.into()),
            Matcher::UrlEncoded("client_id".into(), "app".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("at1", None, Some(id_token("alice", 600))))
        .expect(1)
        .create_async()
        .await;

    let backend = backend_with("xyz", Some("v1"));
    let h = durable(
        config(&server),
        "https://app.example/?code=abc&state=xyz",
        backend.clone(),
    );

    assert!(h.session.run().await);
    token.assert_async().await;

    assert_eq!(h.events.all(), vec!["access:at1", "id:alice"]);
    assert_eq!(h.session.state(), AuthState::LoggedIn);
    assert_eq!(h.session.access_token().as_deref(), Some("at1"));
    assert_eq!(h.location.href(), APP);
    assert_eq!(h.location.replacements(), 1);
    assert!(backend.is_empty(), "pending request should be consumed");
    assert!(!h.session.renewal_pending());

    let remaining = h.session.expires_in_seconds().unwrap();
    assert!((595..=600).contains(&remaining), "{remaining}");
}

#[tokio::test]
async fn provider_error_is_reported_and_scrubbed() {
    let (server, _discovery) = provider().await;
    let h = durable(
        config(&server),
        "https://app.example/#error=access_denied&error_description=User+cancelled&state=xyz",
        backend_with("xyz", Some("v1")),
    );

    assert!(!h.session.run().await);

    let errors = h.events.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("access_denied"), "{errors:?}");
    assert!(errors[0].contains("User cancelled"), "{errors:?}");
    assert_eq!(h.session.state(), AuthState::Error);
    assert_eq!(
        h.location.href(),
        "https://app.example/#error_description=User+cancelled"
    );
    assert_eq!(h.location.replacements(), 1);
    assert_eq!(h.session.expires_in_seconds(), None);
}

#[tokio::test]
async fn query_error_skips_exchange() {
    let (mut server, _discovery) = provider().await;
    let token = server
        .mock("POST", "/token")
        .expect(0)
        .create_async()
        .await;
    let h = durable(
        config(&server),
        "https://app.example/?error=access_denied&state=xyz",
        backend_with("xyz", Some("v1")),
    );

    assert!(!h.session.run().await);
    token.assert_async().await;
    assert_eq!(h.events.errors().len(), 1);
    assert_eq!(h.location.href(), APP);
}

#[tokio::test]
async fn second_run_does_not_consume_again() {
    let (mut server, _discovery) = provider().await;
    let token = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("at1", None, None))
        .expect(1)
        .create_async()
        .await;
    let h = durable(
        config(&server),
        "https://app.example/?code=abc&state=xyz",
        backend_with("xyz", Some("v1")),
    );

    assert!(h.session.run().await);
    assert!(!h.session.run().await);
    token.assert_async().await;
    assert_eq!(h.events.all(), vec!["access:at1"]);
    assert_eq!(h.location.replacements(), 1);
    assert_eq!(h.session.state(), AuthState::LoggedIn);
}

#[tokio::test]
async fn unknown_state_is_rejected_without_exchange() {
    let (mut server, _discovery) = provider().await;
    let token = server
        .mock("POST", "/token")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let h = durable(
        config(&server),
        "https://app.example/?code=abc&state=forged",
        backend_with("xyz", Some("v1")),
    );

    assert!(!h.session.run().await);
    token.assert_async().await;
    let errors = h.events.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("forged"), "{errors:?}");
    assert_eq!(h.location.href(), APP);
}

#[tokio::test]
async fn plain_load_does_nothing() {
    let (server, _discovery) = provider().await;
    let h = durable(
        config(&server),
        "https://app.example/page?tab=2",
        Arc::new(MemoryStore::new()),
    );

    assert!(!h.session.run().await);
    assert!(h.events.all().is_empty());
    assert_eq!(h.location.replacements(), 0);
    assert_eq!(h.session.state(), AuthState::LoggedOut);
}

#[tokio::test]
async fn expiry_falls_back_to_expires_in() {
    let (mut server, _discovery) = provider().await;
    let _token = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("at1", None, None))
        .create_async()
        .await;

    let h = durable(
        config(&server),
        "https://app.example/?code=abc&state=xyz",
        backend_with("xyz", Some("v1")),
    );

    assert!(h.session.run().await);
    assert_eq!(h.events.all(), vec!["access:at1"]);
    let remaining = h.session.expires_in_seconds().unwrap();
    assert!((295..=300).contains(&remaining), "{remaining}");
}

#[tokio::test]
async fn unattainable_headroom_skips_renewal() {
    let (mut server, _discovery) = provider().await;
    let _token = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("at1", Some("r1"), Some(id_token("alice", 200))))
        .create_async()
        .await;

    let h = durable(
        config(&server).with_min_validity(300),
        "https://app.example/?code=abc&state=xyz",
        backend_with("xyz", Some("v1")),
    );

    assert!(h.session.run().await);
    let events = h.events.all();
    assert_eq!(events[..2], ["access:at1", "id:alice"]);
    assert_eq!(events.len(), 3);
    assert!(events[2].contains("unattainable"), "{events:?}");
    assert!(!h.session.renewal_pending());
}

#[tokio::test]
async fn renewal_is_armed_with_headroom() {
    let (mut server, _discovery) = provider().await;
    let _token = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("at1", Some("r1"), Some(id_token("alice", 3600))))
        .create_async()
        .await;

    let h = durable(
        config(&server).with_min_validity(300),
        "https://app.example/?code=abc&state=xyz",
        backend_with("xyz", Some("v1")),
    );

    assert!(h.session.run().await);
    assert!(h.session.renewal_pending());
    assert!(h.events.errors().is_empty());

    h.session.stop();
    h.session.stop();
    assert!(!h.session.renewal_pending());
    assert_eq!(h.session.state(), AuthState::LoggedIn);
}

#[tokio::test]
async fn renewal_refreshes_then_stops_on_failure() {
    let (mut server, _discovery) = provider().await;
    let _code = server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded(
            "grant_type".into(),
            "authorization_code".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("at1", Some("r1"), Some(id_token("alice", 12))))
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "r1".into()),
            Matcher::UrlEncoded("redirect_uri".into(), APP.into()),
        ]))
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .expect(1)
        .create_async()
        .await;

    let h = durable(
        config(&server).with_min_validity(10),
        "https://app.example/?code=abc&state=xyz",
        backend_with("xyz", Some("v1")),
    );

    assert!(h.session.run().await);
    assert!(h.session.renewal_pending());

    h.events.wait_for("error:", 1).await;
    refresh.assert_async().await;

    let errors = h.events.errors();
    assert!(errors[0].contains("invalid_grant"), "{errors:?}");
    assert!(!h.session.renewal_pending());
    assert_eq!(h.session.state(), AuthState::Error);
}

#[tokio::test]
async fn renewal_delivers_new_access_token() {
    let (mut server, _discovery) = provider().await;
    let _code = server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded(
            "grant_type".into(),
            "authorization_code".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("at1", Some("r1"), Some(id_token("alice", 12))))
        .create_async()
        .await;
    let _refresh = server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded(
            "grant_type".into(),
            "refresh_token".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("at2", Some("r2"), Some(id_token("alice", 3600))))
        .create_async()
        .await;

    let h = durable(
        config(&server).with_min_validity(10),
        "https://app.example/?code=abc&state=xyz",
        backend_with("xyz", Some("v1")),
    );

    assert!(h.session.run().await);
    h.events.wait_for("access:at2", 1).await;

    assert_eq!(h.session.access_token().as_deref(), Some("at2"));
    assert!(h.session.renewal_pending());
    assert!(h.events.errors().is_empty());
}

async fn logged_in(server: &mut ServerGuard) -> (Harness, Mock) {
    let token = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("at1", Some("r1"), Some(id_token("alice", 3600))))
        .create_async()
        .await;
    let h = durable(
        config(server).with_min_validity(30),
        "https://app.example/?code=abc&state=xyz",
        backend_with("xyz", Some("v1")),
    );
    assert!(h.session.run().await);
    assert!(h.session.renewal_pending());
    (h, token)
}

#[tokio::test]
async fn logout_revokes_and_clears_session() {
    let (mut server, _discovery) = provider().await;
    let (h, _token) = logged_in(&mut server).await;
    let revoke = server
        .mock("POST", "/revoke")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("token".into(), "r1".into()),
            Matcher::UrlEncoded("token_type_hint".into(), "refresh_token".into()),
        ]))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    h.session.logout().await;
    revoke.assert_async().await;

    assert_eq!(h.events.all()[2..], ["access:none", "logout"]);
    assert!(!h.session.renewal_pending());
    assert_eq!(h.session.state(), AuthState::LoggedOut);
    assert_eq!(h.session.access_token(), None);
    assert_eq!(h.session.expires_in_seconds(), None);
    assert!(h.session.id_token_claims().is_none());
}

#[tokio::test]
async fn logout_clears_session_when_revocation_fails() {
    let (mut server, _discovery) = provider().await;
    let (h, _token) = logged_in(&mut server).await;
    let _revoke = server
        .mock("POST", "/revoke")
        .with_status(503)
        .create_async()
        .await;

    h.session.logout().await;

    assert_eq!(h.events.all()[2..], ["access:none", "logout"]);
    assert!(h.events.errors().is_empty());
    assert_eq!(h.session.state(), AuthState::LoggedOut);
    assert!(!h.session.renewal_pending());
}

/// Token endpoint that answers code grants at once but holds every refresh
/// grant until `release` is notified.
struct StallingTokenEndpoint {
    url: String,
    refresh_started: Arc<Notify>,
    release: Arc<Notify>,
    answered: Arc<Notify>,
}

impl StallingTokenEndpoint {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/token", listener.local_addr().unwrap());
        let endpoint = Self {
            url,
            refresh_started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
            answered: Arc::new(Notify::new()),
        };
        let (started, release, answered) = (
            endpoint.refresh_started.clone(),
            endpoint.release.clone(),
            endpoint.answered.clone(),
        );
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let (started, release, answered) =
                    (started.clone(), release.clone(), answered.clone());
                tokio::spawn(async move {
                    let form = read_body(&mut stream).await;
                    let refresh = form.contains("grant_type=refresh_token");
                    let reply = if refresh {
                        started.notify_one();
                        release.notified().await;
                        token_body("at2", Some("r2"), Some(id_token("alice", 3600)))
                    } else {
                        token_body("at1", Some("r1"), Some(id_token("alice", 12)))
                    };
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{reply}",
                        reply.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                    if refresh {
                        answered.notify_one();
                    }
                });
            }
        });
        endpoint
    }
}

async fn read_body(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            return String::new();
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).into_owned();
        let Some(end) = text.find("\r\n\r\n") else {
            continue;
        };
        let length = text[..end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);
        if text.len() >= end + 4 + length {
            return text[end + 4..end + 4 + length].to_string();
        }
    }
}

#[tokio::test]
async fn logout_discards_refresh_in_flight() {
    let endpoint = StallingTokenEndpoint::start().await;
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _discovery = server
        .mock("GET", "/.well-known/openid-configuration")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/auth"),
                "token_endpoint": endpoint.url,
                "revocation_endpoint": format!("{base}/revoke"),
            })
            .to_string(),
        )
        .create_async()
        .await;
    let _revoke = server
        .mock("POST", "/revoke")
        .with_status(200)
        .create_async()
        .await;

    let h = durable(
        config(&server).with_min_validity(10),
        "https://app.example/?code=abc&state=xyz",
        backend_with("xyz", Some("v1")),
    );
    assert!(h.session.run().await);

    tokio::time::timeout(Duration::from_secs(10), endpoint.refresh_started.notified())
        .await
        .expect("renewal never started");
    h.session.logout().await;
    assert_eq!(h.session.state(), AuthState::LoggedOut);

    endpoint.release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), endpoint.answered.notified())
        .await
        .expect("refresh never answered");
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(
        h.events.all(),
        vec!["access:at1", "id:alice", "access:none", "logout"]
    );
    assert_eq!(h.session.access_token(), None);
    assert_eq!(h.session.expires_in_seconds(), None);
    assert!(!h.session.renewal_pending());
    assert_eq!(h.session.state(), AuthState::LoggedOut);
}

#[tokio::test]
async fn logout_without_refresh_token_skips_revocation() {
    let (mut server, _discovery) = provider().await;
    let revoke = server
        .mock("POST", "/revoke")
        .expect(0)
        .create_async()
        .await;
    let h = durable(config(&server), APP, Arc::new(MemoryStore::new()));

    h.session.logout().await;
    revoke.assert_async().await;
    assert_eq!(h.events.all(), vec!["access:none", "logout"]);
}

#[tokio::test]
async fn login_verifier_matches_later_exchange() {
    let (mut server, _discovery) = provider().await;
    let backend = Arc::new(MemoryStore::new());

    let first = durable(config(&server), APP, backend.clone());
    first.session.login().await;

    let url = first.navigator.last().expect("login should navigate");
    assert!(url.starts_with(&format!("{}/auth?", server.url())), "{url}");
    let params = query(&url);
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["client_id"], "app");
    assert_eq!(params["redirect_uri"], APP);
    assert_eq!(params["code_challenge_method"], "S256");
    let state = params["state"].clone();

    let stored: serde_json::Value =
        serde_json::from_str(&backend.get(&format!("wicket.pending.{state}")).unwrap()).unwrap();
    let verifier = stored["code_verifier"].as_str().unwrap().to_string();
    assert_eq!(params["code_challenge"], challenge_for(&verifier));

    let token = server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("code_verifier".into(), verifier))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("at1", None, None))
        .expect(1)
        .create_async()
        .await;

    let second = durable(
        config(&server),
        &format!("https://app.example/?state={state}&code=abc&session_state=s1"),
        backend.clone(),
    );
    assert!(second.session.run().await);
    token.assert_async().await;
    assert_eq!(second.location.href(), APP);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn ephemeral_mode_skips_pkce() {
    let (mut server, _discovery) = provider().await;
    let token = server
        .mock("POST", "/token")
        .match_body(Matcher::Exact(
            "grant_type=authorization_code&code=abc&redirect_uri=https%3A%2F%2Fapp.example%2F&client_id=app"
                .into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body("at1", None, None))
        .expect(1)
        .create_async()
        .await;

    let location = Arc::new(MemoryLocation::new("https://app.example/?code=abc&state=xyz"));
    let store = Arc::new(ReplayStore::new(location.clone()));
    let h = harness(config(&server), location, store);

    assert!(h.session.run().await);
    token.assert_async().await;
    assert_eq!(h.location.href(), APP);

    h.session.login().await;
    let params = query(&h.navigator.last().unwrap());
    assert!(!params.contains_key("code_challenge"));
    assert!(params.contains_key("state"));
}

#[tokio::test]
async fn discovery_failure_is_reported_once() {
    let mut server = mockito::Server::new_async().await;
    let _discovery = server
        .mock("GET", "/.well-known/openid-configuration")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let h = durable(config(&server), APP, Arc::new(MemoryStore::new()));
    assert!(!h.session.run().await);
    h.events.wait_for("error:", 1).await;

    h.session.login().await;
    assert!(h.navigator.visited().is_empty());

    let errors = h.events.errors();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("discovery"), "{errors:?}");
    assert!(h.session.provider_configuration().is_none());
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[tokio::test]
async fn login_after_discovery_failure_warns() {
    let logs = LogCapture::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut server = mockito::Server::new_async().await;
    let _discovery = server
        .mock("GET", "/.well-known/openid-configuration")
        .with_status(500)
        .create_async()
        .await;
    let h = durable(config(&server), APP, Arc::new(MemoryStore::new()));
    assert!(!h.session.run().await);
    h.events.wait_for("error:", 1).await;

    h.session.login().await;

    assert!(h.navigator.visited().is_empty());
    assert_eq!(h.events.errors().len(), 1);
    assert!(
        logs.text().contains("login skipped: provider discovery failed"),
        "{}",
        logs.text()
    );
}

#[tokio::test]
async fn shutdown_silences_the_session() {
    let (server, _discovery) = provider().await;
    let h = durable(config(&server), APP, Arc::new(MemoryStore::new()));

    h.session.shutdown();
    h.session.login().await;
    h.session.logout().await;

    assert!(h.navigator.visited().is_empty());
    assert!(h.events.all().is_empty());
}
