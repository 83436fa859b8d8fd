//! OpenID Connect provider discovery.
//!
//! Fetches `{issuer}/.well-known/openid-configuration` once and shares the
//! outcome with every caller that needs an endpoint.

use std::sync::Arc;

use {
    futures::{
        FutureExt,
        future::{BoxFuture, Shared},
    },
    reqwest::Client,
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
    url::Url,
};

use crate::{Error, Result};

/// Endpoints advertised by the provider's discovery document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfiguration {
    #[serde(default)]
    pub issuer: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    /// RFC 7009 revocation endpoint.
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

/// Fetch the discovery document for `issuer`.
pub async fn fetch_configuration(client: &Client, issuer: &str) -> Result<ProviderConfiguration> {
    let well_known = build_well_known_url(issuer)?;

    debug!(url = %well_known, "fetching provider configuration");

    let resp = client
        .get(well_known.as_str())
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|source| Error::external("failed to fetch provider configuration", source))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::message(format!(
            "provider configuration returned HTTP {status}: {body}"
        )));
    }

    let config: ProviderConfiguration = resp
        .json()
        .await
        .map_err(|source| Error::external("failed to parse provider configuration", source))?;

    info!(
        issuer = config.issuer.as_deref().unwrap_or(issuer),
        revocation = config.revocation_endpoint.is_some(),
        "fetched provider configuration"
    );

    Ok(config)
}

type SharedOutcome = std::result::Result<Arc<ProviderConfiguration>, Arc<Error>>;

/// A single discovery fetch whose result every awaiter shares.
///
/// The fetch makes progress only while something polls it, so the session
/// spawns a driver as soon as discovery starts.
#[derive(Clone)]
pub struct Discovery {
    future: Shared<BoxFuture<'static, SharedOutcome>>,
}

impl Discovery {
    pub fn start(client: Client, issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();
        let future = async move {
            fetch_configuration(&client, &issuer)
                .await
                .map(Arc::new)
                .map_err(Arc::new)
        }
        .boxed()
        .shared();
        Self { future }
    }

    /// Wait for the provider configuration.
    pub async fn wait(&self) -> Result<Arc<ProviderConfiguration>> {
        self.future.clone().await.map_err(Error::Discovery)
    }

    /// The configuration, if discovery already succeeded.
    pub fn peek(&self) -> Option<Arc<ProviderConfiguration>> {
        self.future.peek().and_then(|outcome| outcome.clone().ok())
    }
}

/// `{issuer}/.well-known/openid-configuration`, keeping the issuer's path.
fn build_well_known_url(issuer: &str) -> Result<Url> {
    let trimmed = issuer.trim_end_matches('/');
    let mut url = Url::parse(&format!("{trimmed}/"))?;
    url = url
        .join(".well-known/openid-configuration")
        .map_err(|source| {
            Error::external(
                format!("failed to build discovery URL from {issuer}"),
                source,
            )
        })?;
    Ok(url)
}
