//! Config schema: the OpenID Connect client settings plus the host's storage
//! and HTTP choices.

use std::path::PathBuf;

use {
    serde::Deserialize,
    wicket_oauth::{ClientConfig, OidcConfig},
};

#[derive(Debug, Clone, Deserialize)]
pub struct WicketConfig {
    /// Issuer base URL.
    pub auth_server_url: String,
    pub client: ClientConfig,
    #[serde(default)]
    pub min_validity_seconds: Option<u64>,
    /// Verbose protocol logging.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl WicketConfig {
    /// Settings for [`wicket_oauth::AuthSession`].
    pub fn oidc_config(&self) -> OidcConfig {
        let mut config = OidcConfig::new(self.auth_server_url.clone(), self.client.clone());
        config.min_validity_seconds = self.min_validity_seconds;
        config.debug = self.debug;
        config.http_timeout_secs = self.http.timeout_secs;
        config
    }
}

/// Where pending authorization requests are kept between redirects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// In-process map. Survives the redirect as long as the process does.
    #[default]
    Memory,
    /// JSON file at `storage.path`.
    File,
    /// Nothing is stored; PKCE is disabled and `state` is not checked.
    Ephemeral,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Ephemeral => "ephemeral",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mode: StorageMode,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}
