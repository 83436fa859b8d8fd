use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    tracing::{debug, info},
    wicket_config::{StorageMode, WicketConfig},
    wicket_oauth::{
        AuthEvent, AuthSession, DurableStore, FileStore, KeyValueStore, Location, MemoryLocation,
        MemoryStore, PendingStore, ReplayStore, fetch_configuration,
    },
};

use crate::{callback_server::CallbackServer, host::BrowserNavigator};

/// How long `wicket login` waits for the browser to come back.
const REDIRECT_TIMEOUT: Duration = Duration::from_secs(300);

pub struct LoginOptions {
    pub no_browser: bool,
    pub watch: bool,
    pub show_token: bool,
}

pub async fn discover(config: &WicketConfig) -> Result<()> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .build()?;
    let provider = fetch_configuration(&http, config.oidc_config().issuer()).await?;
    println!("{}", serde_json::to_string_pretty(&provider)?);
    Ok(())
}

pub async fn login(config: &WicketConfig, opts: LoginOptions) -> Result<()> {
    let oidc = config.oidc_config();
    let redirect_uri = oidc
        .client
        .redirect_uri
        .clone()
        .context("client.redirect_uri must be set to a loopback URL for `wicket login`")?;
    let backend = durable_backend(config)?;
    let server = CallbackServer::bind(&redirect_uri).await?;

    let location = Arc::new(MemoryLocation::new(redirect_uri.clone()));
    let starter = AuthSession::new(
        oidc.clone(),
        location.clone(),
        Arc::new(BrowserNavigator::new(!opts.no_browser)),
        pending_store(backend.as_ref(), location),
    )?;
    let reporter = Reporter::attach(&starter);
    starter.run().await;
    starter.login().await;
    if starter.provider_configuration().is_none() || reporter.last_error().is_some() {
        bail!(
            "could not start login: {}",
            reporter
                .last_error()
                .unwrap_or_else(|| "provider discovery failed".to_string())
        );
    }
    drop(starter);

    println!("Waiting for redirect on {redirect_uri} ...");
    let href = server.wait_for_redirect(REDIRECT_TIMEOUT).await?;

    let location = Arc::new(MemoryLocation::new(href));
    let session = AuthSession::new(
        oidc,
        location.clone(),
        Arc::new(BrowserNavigator::new(false)),
        pending_store(backend.as_ref(), location),
    )?;
    let reporter = Reporter::attach(&session);
    if !session.run().await {
        bail!(
            "login failed: {}",
            reporter
                .last_error()
                .unwrap_or_else(|| "no authorization code in redirect".to_string())
        );
    }

    print_session(&session, opts.show_token);

    if opts.watch {
        println!("Keeping the session renewed. Press Ctrl-C to log out.");
        tokio::signal::ctrl_c().await?;
        session.logout().await;
    }
    Ok(())
}

/// Backend for durable modes, shared by both halves of the login. `None` in
/// ephemeral mode.
fn durable_backend(config: &WicketConfig) -> Result<Option<Arc<dyn KeyValueStore>>> {
    let backend: Arc<dyn KeyValueStore> = match config.storage.mode {
        StorageMode::Ephemeral => return Ok(None),
        StorageMode::Memory => Arc::new(MemoryStore::new()),
        StorageMode::File => {
            let path = config
                .storage
                .path
                .clone()
                .context("storage.path is required when storage.mode = \"file\"")?;
            Arc::new(FileStore::new(path))
        },
    };
    debug!(mode = config.storage.mode.as_str(), "pending store selected");
    Ok(Some(backend))
}

fn pending_store(
    backend: Option<&Arc<dyn KeyValueStore>>,
    location: Arc<MemoryLocation>,
) -> Arc<dyn PendingStore> {
    match backend {
        Some(backend) => Arc::new(DurableStore::new(Arc::clone(backend))),
        None => {
            let location: Arc<dyn Location> = location;
            Arc::new(ReplayStore::new(location))
        },
    }
}

/// Prints session events and remembers the last error.
struct Reporter {
    last_error: Arc<Mutex<Option<String>>>,
}

impl Reporter {
    fn attach(session: &AuthSession) -> Self {
        let last_error = Arc::new(Mutex::new(None));
        let tokens = AtomicUsize::new(0);
        let sink = Arc::clone(&last_error);
        session.on_event(move |event| match event {
            AuthEvent::AccessToken(Some(_)) => {
                if tokens.fetch_add(1, Ordering::SeqCst) > 0 {
                    println!("Access token renewed.");
                }
            },
            AuthEvent::AccessToken(None) => debug!("access token cleared"),
            AuthEvent::IdToken { claims, .. } => {
                let subject = claims.as_ref().and_then(|c| c.subject());
                info!(subject, "ID token received");
            },
            AuthEvent::Logout => println!("Logged out."),
            AuthEvent::Error(err) => {
                eprintln!("error: {err}");
                *sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.to_string());
            },
        });
        Self { last_error }
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn print_session(session: &AuthSession, show_token: bool) {
    println!("Logged in.");
    if let Some(subject) = session
        .id_token_claims()
        .as_ref()
        .and_then(|c| c.subject().map(str::to_string))
    {
        println!("  Subject: {subject}");
    }
    println!("  Expires: {}", describe_expiry(session.expires_in_seconds()));
    if session.renewal_pending() {
        println!("  Renewal: scheduled");
    }
    if show_token && let Some(token) = session.access_token() {
        println!("{token}");
    }
}

fn describe_expiry(remaining: Option<i64>) -> String {
    match remaining {
        None => "unknown".to_string(),
        Some(secs) if secs <= 0 => "expired".to_string(),
        Some(secs) => {
            let (mins, secs) = (secs / 60, secs % 60);
            if mins >= 60 {
                format!("in {}h {}m", mins / 60, mins % 60)
            } else {
                format!("in {mins}m {secs}s")
            }
        },
    }
}
