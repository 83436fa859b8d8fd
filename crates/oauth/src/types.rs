use std::collections::BTreeMap;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Client credentials registered with the identity provider.
#[derive(Clone, Deserialize)]
pub struct ClientIdentity {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<Secret<String>>,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

fn default_scope() -> String {
    "openid".to_string()
}

/// Client-side settings for the authorization request.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(flatten)]
    pub identity: ClientIdentity,
    /// Where the provider sends the browser back to. Defaults to the current
    /// address with the protocol parameters removed.
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Forwarded verbatim as extra authorization request parameters.
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            identity: ClientIdentity {
                client_id: client_id.into(),
                client_secret: None,
            },
            redirect_uri: None,
            scope: default_scope(),
            extras: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.identity.client_secret = Some(Secret::new(secret.into()));
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

/// Top-level OpenID Connect settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    /// Issuer base URL, e.g. `https://idp.example/realms/main`.
    pub auth_server_url: String,
    pub client: ClientConfig,
    /// Renew this many seconds before the access token expires. `None` or
    /// zero disables automatic renewal.
    #[serde(default)]
    pub min_validity_seconds: Option<u64>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl OidcConfig {
    pub fn new(auth_server_url: impl Into<String>, client: ClientConfig) -> Self {
        Self {
            auth_server_url: auth_server_url.into(),
            client,
            min_validity_seconds: None,
            debug: false,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }

    #[must_use]
    pub fn with_min_validity(mut self, seconds: u64) -> Self {
        self.min_validity_seconds = Some(seconds);
        self
    }

    /// Issuer URL with trailing slashes trimmed.
    pub fn issuer(&self) -> &str {
        self.auth_server_url.trim_end_matches('/')
    }

    /// Renewal headroom, if automatic renewal is enabled.
    pub fn renewal_headroom(&self) -> Option<u64> {
        self.min_validity_seconds.filter(|secs| *secs > 0)
    }
}

/// Tokens returned by the token endpoint.
#[derive(Clone)]
pub struct TokenSet {
    pub access_token: Secret<String>,
    pub refresh_token: Option<Secret<String>>,
    /// Raw compact JWT.
    pub id_token: Option<Secret<String>>,
    /// Lifetime reported by the token endpoint, in seconds.
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// State kept between the login redirect and the return redirect.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    /// Unix timestamp when the request was issued.
    #[serde(default)]
    pub created_at: u64,
}

impl PendingAuthorization {
    /// Pending requests older than this are rejected on return.
    pub const TTL_SECS: u64 = 600;

    pub fn new(state: impl Into<String>, code_verifier: Option<String>) -> Self {
        Self {
            state: state.into(),
            code_verifier,
            created_at: now_secs(),
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.created_at > 0 && now.saturating_sub(self.created_at) > Self::TTL_SECS
    }
}

impl std::fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("state", &self.state)
            .field(
                "code_verifier",
                &self.code_verifier.as_ref().map(|_| "[REDACTED]"),
            )
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Externally visible authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    LoggedOut,
    InProgress,
    LoggedIn,
    Error,
}

/// Seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Expose a secret string for wire encoding.
pub(crate) fn expose(secret: &Secret<String>) -> &str {
    secret.expose_secret().as_str()
}
