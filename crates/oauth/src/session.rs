//! The authentication state machine.
//!
//! [`AuthSession`] consumes the provider's redirect, exchanges codes and
//! refresh tokens, keeps the access token renewed, and logs out. Everything
//! asynchronous holds only a weak reference to the session and checks the
//! liveness flag before touching observable state, so dropping the session
//! while a request is in flight silently discards the result.

use std::sync::{
    Arc, Mutex, OnceLock, Weak,
    atomic::{AtomicBool, Ordering},
};

use {
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, error, info, warn},
};

use crate::{
    Error, Result,
    callback::{self, CallbackParams},
    claims::{IdTokenClaims, decode_claims},
    discovery::{Discovery, ProviderConfiguration},
    events::{AuthEvent, EventFn, Listeners},
    flow::build_authorization_request,
    host::{Location, Navigator},
    renewal::{RenewalTimer, renewal_delay},
    store::PendingStore,
    token::{Grant, TokenClient},
    types::{AuthState, OidcConfig, TokenSet, now_secs},
};

/// Facade over the authorization code flow.
///
/// Lifecycle: construct, [`run`](Self::run) once per page load, then
/// [`login`](Self::login) if the user is not logged in. After
/// [`logout`](Self::logout) the session is spent; build a new one for the
/// next login.
pub struct AuthSession {
    inner: Arc<Inner>,
}

struct Inner {
    config: OidcConfig,
    location: Arc<dyn Location>,
    navigator: Arc<dyn Navigator>,
    store: Arc<dyn PendingStore>,
    tokens: TokenClient,
    discovery: OnceLock<Discovery>,
    session: Mutex<SessionState>,
    renewal: RenewalTimer,
    listeners: Listeners,
    alive: AtomicBool,
}

#[derive(Default)]
struct SessionState {
    access_token: Option<Secret<String>>,
    refresh_token: Option<Secret<String>>,
    /// Seconds since the epoch. Only set once a token was obtained.
    expires_at: Option<u64>,
    pkce_code_verifier: Option<String>,
    id_token_claims: Option<IdTokenClaims>,
    error: bool,
    in_progress: bool,
    redirect_consumed: bool,
    /// Bumped by every logout. Token responses requested under an earlier
    /// epoch are dropped.
    epoch: u64,
}

impl AuthSession {
    /// Build a session with an HTTP client honouring `config.http_timeout_secs`.
    pub fn new(
        config: OidcConfig,
        location: Arc<dyn Location>,
        navigator: Arc<dyn Navigator>,
        store: Arc<dyn PendingStore>,
    ) -> Result<Self> {
        let tokens =
            TokenClient::with_timeout(config.client.identity.clone(), config.http_timeout_secs)?;
        Ok(Self::from_parts(config, location, navigator, store, tokens))
    }

    /// Build a session on an existing HTTP client.
    pub fn with_http_client(
        config: OidcConfig,
        location: Arc<dyn Location>,
        navigator: Arc<dyn Navigator>,
        store: Arc<dyn PendingStore>,
        http: Client,
    ) -> Self {
        let tokens = TokenClient::new(http, config.client.identity.clone());
        Self::from_parts(config, location, navigator, store, tokens)
    }

    fn from_parts(
        config: OidcConfig,
        location: Arc<dyn Location>,
        navigator: Arc<dyn Navigator>,
        store: Arc<dyn PendingStore>,
        tokens: TokenClient,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                location,
                navigator,
                store,
                tokens,
                discovery: OnceLock::new(),
                session: Mutex::new(SessionState::default()),
                renewal: RenewalTimer::new(),
                listeners: Listeners::default(),
                alive: AtomicBool::new(true),
            }),
        }
    }

    /// Register a listener for [`AuthEvent`]s.
    pub fn on_event(&self, listener: impl Fn(&AuthEvent) + Send + Sync + 'static) {
        let listener: EventFn = Arc::new(listener);
        self.inner.listeners.add(listener);
    }

    /// Start discovery, consume any authorization response in the current
    /// address and exchange its code. Returns `true` iff this call obtained an
    /// access token. Only the first call consumes the address; later calls
    /// return `false`.
    pub async fn run(&self) -> bool {
        let inner = &self.inner;
        if !inner.is_alive() {
            return false;
        }

        let first_pass = {
            let mut session = inner.lock();
            let first = !session.redirect_consumed;
            session.redirect_consumed = true;
            session.in_progress = true;
            first
        };

        inner.ensure_discovery();

        let logged_in = if first_pass {
            match inner.consume_redirect() {
                Ok(Some(code)) => match inner.exchange(Some(&code)).await {
                    Ok(received) => received,
                    Err(e) => {
                        inner.report_operation_error(e);
                        false
                    },
                },
                Ok(None) => false,
                Err(e) => {
                    inner.report_operation_error(e);
                    false
                },
            }
        } else {
            warn!("run() called again; the redirect was already consumed");
            false
        };

        inner.lock().in_progress = false;
        logged_in
    }

    /// Redirect to the provider's authorization endpoint.
    pub async fn login(&self) {
        match self.inner.login().await {
            Ok(()) => {},
            Err(Error::Discovery(cause)) => {
                warn!(error = %cause, "login skipped: provider discovery failed");
            },
            Err(e) => self.inner.report_operation_error(e),
        }
    }

    /// Revoke the refresh token (best effort) and clear the local session.
    pub async fn logout(&self) {
        self.inner.logout().await;
    }

    /// Cancel the pending renewal, if any. In-flight requests are unaffected.
    pub fn stop(&self) {
        self.inner.renewal.cancel();
    }

    /// Seconds until the access token expires. `None` while no token is held.
    pub fn expires_in_seconds(&self) -> Option<i64> {
        self.inner
            .lock()
            .expires_at
            .map(|at| at as i64 - now_secs() as i64)
    }

    pub fn state(&self) -> AuthState {
        self.inner.auth_state()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .lock()
            .access_token
            .as_ref()
            .map(|t| t.expose_secret().clone())
    }

    pub fn id_token_claims(&self) -> Option<IdTokenClaims> {
        self.inner.lock().id_token_claims.clone()
    }

    /// Whether a renewal timer is armed.
    pub fn renewal_pending(&self) -> bool {
        self.inner.renewal.is_armed()
    }

    /// Provider endpoints, once discovery has succeeded.
    pub fn provider_configuration(&self) -> Option<Arc<ProviderConfiguration>> {
        self.inner.discovery.get().and_then(Discovery::peek)
    }

    /// Detach from the host: cancel renewal and silence every continuation
    /// still in flight.
    pub fn shutdown(&self) {
        self.inner.alive.store(false, Ordering::SeqCst);
        self.inner.renewal.cancel();
        debug!("auth session shut down");
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn auth_state(&self) -> AuthState {
        let session = self.lock();
        if session.in_progress {
            AuthState::InProgress
        } else if session.error {
            AuthState::Error
        } else if session.access_token.is_some() {
            AuthState::LoggedIn
        } else {
            AuthState::LoggedOut
        }
    }

    fn emit(&self, event: AuthEvent) {
        if self.is_alive() {
            self.listeners.emit(&event);
        }
    }

    fn report(&self, err: Error) {
        if !self.is_alive() {
            return;
        }
        error!(error = %err, "authentication error");
        self.lock().error = true;
        self.emit(AuthEvent::Error(err));
    }

    /// Discovery failures are reported once by the discovery driver, not by
    /// each operation that waited on it.
    fn report_operation_error(&self, err: Error) {
        match err {
            Error::Discovery(cause) => {
                debug!(error = %cause, "operation aborted by discovery failure");
            },
            err => self.report(err),
        }
    }

    fn redirect_uri(&self) -> String {
        self.config
            .client
            .redirect_uri
            .clone()
            .unwrap_or_else(|| callback::scrub(&self.location.href()))
    }

    fn ensure_discovery(self: &Arc<Self>) -> Discovery {
        self.discovery
            .get_or_init(|| {
                let discovery = Discovery::start(self.tokens.http().clone(), self.config.issuer());
                let driver = discovery.clone();
                let weak = Arc::downgrade(self);
                tokio::spawn(async move {
                    if let Err(e) = driver.wait().await
                        && let Some(inner) = weak.upgrade()
                    {
                        inner.report(e);
                    }
                });
                discovery
            })
            .clone()
    }

    /// Inspect the address for an authorization response. Strips the
    /// protocol parameters once the response has been read.
    fn consume_redirect(&self) -> Result<Option<String>> {
        let params = CallbackParams::parse(&self.location.href());
        if params.is_empty() {
            debug!("no authorization response in address");
            return Ok(None);
        }

        if self.config.debug {
            let mut keys: Vec<&str> = params.params().keys().map(String::as_str).collect();
            keys.sort_unstable();
            info!(location = ?params.location(), params = ?keys, "consuming authorization response");
        }

        let outcome = self.resolve_response(&params);
        self.location.replace(&params.scrub());
        outcome
    }

    fn resolve_response(&self, params: &CallbackParams) -> Result<Option<String>> {
        if let Some(error) = params.error() {
            if let Some(state) = params.state()
                && let Err(e) = self.store.discard(state)
            {
                warn!(error = %e, "failed to discard pending authorization request");
            }
            return Err(Error::authorization(
                error,
                params.get("error_description").map(str::to_string),
            ));
        }

        let Some(code) = params.code() else {
            debug!("authorization response carried no code");
            return Ok(None);
        };
        let returned = params.state().unwrap_or_default();
        if returned.is_empty() {
            return Err(Error::invalid_state(returned));
        }

        match self.store.pending_state(returned)? {
            Some(recorded) if recorded == returned => {},
            _ => return Err(Error::invalid_state(returned)),
        }

        let verifier = if self.store.is_durable() {
            self.store.pending_verifier(returned)?
        } else {
            None
        };
        if let Err(e) = self.store.discard(returned) {
            warn!(error = %e, "failed to discard pending authorization request");
        }

        self.lock().pkce_code_verifier = verifier;
        Ok(Some(code.to_string()))
    }

    /// Code grant when `code` is given, refresh grant otherwise. Returns
    /// whether a token was delivered to listeners.
    async fn exchange(self: &Arc<Self>, code: Option<&str>) -> Result<bool> {
        let epoch = self.lock().epoch;
        let provider = self.ensure_discovery().wait().await?;
        let redirect_uri = self.redirect_uri();

        let response = match code {
            Some(code) => {
                let verifier = self.lock().pkce_code_verifier.take();
                self.tokens
                    .request(
                        &provider.token_endpoint,
                        Grant::AuthorizationCode {
                            code,
                            code_verifier: verifier.as_deref(),
                        },
                        &redirect_uri,
                    )
                    .await
            },
            None => {
                let refresh_token = self
                    .lock()
                    .refresh_token
                    .clone()
                    .ok_or(Error::MissingRefreshToken)?;
                self.tokens
                    .request(
                        &provider.token_endpoint,
                        Grant::RefreshToken {
                            refresh_token: refresh_token.expose_secret(),
                        },
                        &redirect_uri,
                    )
                    .await
            },
        };

        if !self.is_alive() {
            debug!("session gone; discarding token response");
            return Ok(false);
        }
        if self.lock().epoch != epoch {
            debug!("logged out while the token request was in flight; discarding response");
            return Ok(false);
        }
        Ok(self.apply(response?, epoch))
    }

    /// Store `tokens` and notify listeners, unless a logout happened since
    /// `epoch` was read.
    fn apply(self: &Arc<Self>, tokens: TokenSet, epoch: u64) -> bool {
        let raw_id_token = tokens.id_token.as_ref().map(|t| t.expose_secret().clone());
        let claims = raw_id_token
            .as_deref()
            .and_then(|raw| match decode_claims(raw) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    warn!(error = %e, "could not decode ID token claims");
                    None
                },
            });
        let expires_at = claims
            .as_ref()
            .and_then(IdTokenClaims::expires_at)
            .or_else(|| tokens.expires_in.map(|secs| now_secs() + secs));
        let access_token = tokens.access_token.expose_secret().clone();

        let has_refresh_token = {
            let mut session = self.lock();
            if session.epoch != epoch {
                debug!("logged out while the token response was processed; discarding it");
                return false;
            }
            session.access_token = Some(tokens.access_token);
            session.expires_at = expires_at;
            if let Some(refresh_token) = tokens.refresh_token {
                session.refresh_token = Some(refresh_token);
            }
            session.id_token_claims = claims.clone();
            session.error = false;
            session.refresh_token.is_some()
        };

        debug!(expires_at, has_refresh_token, "session updated");
        self.emit(AuthEvent::AccessToken(Some(access_token)));
        if let Some(raw) = raw_id_token {
            self.emit(AuthEvent::IdToken { raw, claims });
        }

        if has_refresh_token {
            self.schedule_renewal();
        }
        true
    }

    fn schedule_renewal(self: &Arc<Self>) {
        let Some(headroom) = self.config.renewal_headroom() else {
            return;
        };
        let Some(expires_at) = self.lock().expires_at else {
            debug!("token expiry unknown; renewal not scheduled");
            return;
        };

        match renewal_delay(expires_at, now_secs(), headroom) {
            Ok(delay) => {
                let weak = Arc::downgrade(self);
                self.renewal.arm(delay, renew(weak));
            },
            Err(e) => self.report(e),
        }
    }

    async fn login(self: &Arc<Self>) -> Result<()> {
        let provider = self.ensure_discovery().wait().await?;
        if !self.is_alive() {
            return Ok(());
        }

        let redirect_uri = self.redirect_uri();
        let request = build_authorization_request(
            &provider,
            &self.config.client,
            &redirect_uri,
            self.store.is_durable(),
        )?;
        self.store.save(&request.pending)?;
        self.lock().error = false;

        if self.config.debug {
            info!(url = %request.url, "redirecting to authorization endpoint");
        } else {
            info!(
                pkce = request.pending.code_verifier.is_some(),
                "redirecting to authorization endpoint"
            );
        }
        self.navigator.navigate(&request.url);
        Ok(())
    }

    async fn logout(self: &Arc<Self>) {
        if !self.is_alive() {
            return;
        }
        {
            let mut session = self.lock();
            session.in_progress = true;
            session.epoch += 1;
        }
        let _reset = ResetOnDrop { inner: self.as_ref() };

        self.renewal.cancel();

        let refresh_token = self.lock().refresh_token.clone();
        if let Some(refresh_token) = refresh_token
            && let Err(e) = self.revoke(refresh_token.expose_secret()).await
        {
            warn!(error = %e, "refresh token revocation failed");
        }
    }

    async fn revoke(self: &Arc<Self>, refresh_token: &str) -> Result<()> {
        let provider = self.ensure_discovery().wait().await?;
        let Some(endpoint) = provider.revocation_endpoint.as_deref() else {
            debug!("provider has no revocation endpoint");
            return Ok(());
        };
        self.tokens
            .revoke(endpoint, refresh_token, "refresh_token")
            .await
    }

    fn finish_logout(&self) {
        if !self.is_alive() {
            return;
        }
        {
            let mut session = self.lock();
            let epoch = session.epoch;
            *session = SessionState {
                redirect_consumed: true,
                epoch,
                ..SessionState::default()
            };
        }
        info!("logged out");
        self.emit(AuthEvent::AccessToken(None));
        self.emit(AuthEvent::Logout);
    }
}

/// Local logout cleanup. Runs when `logout()` completes or is dropped midway.
struct ResetOnDrop<'a> {
    inner: &'a Inner,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.inner.finish_logout();
    }
}

async fn renew(weak: Weak<Inner>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    if !inner.is_alive() {
        return;
    }

    info!("renewing access token");
    if let Err(e) = inner.exchange(None).await {
        warn!(error = %e, "token renewal failed; renewal stopped");
        inner.report_operation_error(e);
    }
}
