//! Token endpoint grants and RFC 7009 revocation.

use std::time::Duration;

use {
    reqwest::Client,
    secrecy::Secret,
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    types::{ClientIdentity, TokenSet, expose},
};

/// Which grant to send to the token endpoint.
#[derive(Debug, Clone, Copy)]
pub enum Grant<'a> {
    AuthorizationCode {
        code: &'a str,
        code_verifier: Option<&'a str>,
    },
    RefreshToken {
        refresh_token: &'a str,
    },
}

impl Grant<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }
}

/// Talks to the provider's token and revocation endpoints.
#[derive(Clone)]
pub struct TokenClient {
    http: Client,
    identity: ClientIdentity,
}

impl TokenClient {
    pub fn new(http: Client, identity: ClientIdentity) -> Self {
        Self { http, identity }
    }

    /// Build a client with a request timeout.
    pub fn with_timeout(identity: ClientIdentity, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|source| Error::external("failed to build HTTP client", source))?;
        Ok(Self::new(http, identity))
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Form body for a token request.
    pub fn grant_form(&self, grant: Grant<'_>, redirect_uri: &str) -> Vec<(String, String)> {
        let mut form = vec![("grant_type".to_string(), grant.name().to_string())];
        match grant {
            Grant::AuthorizationCode {
                code,
                code_verifier,
            } => {
                form.push(("code".to_string(), code.to_string()));
                if let Some(verifier) = code_verifier {
                    form.push(("code_verifier".to_string(), verifier.to_string()));
                }
            },
            Grant::RefreshToken { refresh_token } => {
                form.push(("refresh_token".to_string(), refresh_token.to_string()));
            },
        }
        form.push(("redirect_uri".to_string(), redirect_uri.to_string()));
        self.push_identity(&mut form);
        form
    }

    fn push_identity(&self, form: &mut Vec<(String, String)>) {
        form.push(("client_id".to_string(), self.identity.client_id.clone()));
        if let Some(secret) = &self.identity.client_secret {
            form.push(("client_secret".to_string(), expose(secret).to_string()));
        }
    }

    /// Send `grant` to `token_endpoint`.
    pub async fn request(
        &self,
        token_endpoint: &str,
        grant: Grant<'_>,
        redirect_uri: &str,
    ) -> Result<TokenSet> {
        let form = self.grant_form(grant, redirect_uri);
        debug!(endpoint = token_endpoint, grant = grant.name(), "requesting tokens");

        let resp = self
            .http
            .post(token_endpoint)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|source| Error::external("token request failed", source))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), grant = grant.name(), "token endpoint rejected grant");
            return Err(Error::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|source| Error::external("failed to parse token response", source))?;
        let tokens = parse_token_response(&body)?;

        info!(
            grant = grant.name(),
            refresh_token = tokens.refresh_token.is_some(),
            id_token = tokens.id_token.is_some(),
            "token grant succeeded"
        );
        Ok(tokens)
    }

    /// Revoke `token` at `revocation_endpoint` (RFC 7009).
    pub async fn revoke(
        &self,
        revocation_endpoint: &str,
        token: &str,
        token_type_hint: &str,
    ) -> Result<()> {
        let mut form = vec![
            ("token".to_string(), token.to_string()),
            ("token_type_hint".to_string(), token_type_hint.to_string()),
        ];
        self.push_identity(&mut form);

        let resp = self
            .http
            .post(revocation_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|source| Error::external("revocation request failed", source))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::message(format!(
                "revocation endpoint returned HTTP {status}: {body}"
            )));
        }

        debug!(token_type_hint, "token revoked");
        Ok(())
    }
}

fn parse_token_response(resp: &serde_json::Value) -> Result<TokenSet> {
    let access_token = resp["access_token"]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::message("missing access_token in token response"))?
        .to_string();

    let refresh_token = resp["refresh_token"].as_str().map(|s| s.to_string());
    let id_token = resp["id_token"].as_str().map(|s| s.to_string());

    Ok(TokenSet {
        access_token: Secret::new(access_token),
        refresh_token: refresh_token.map(Secret::new),
        id_token: id_token.map(Secret::new),
        expires_in: resp["expires_in"].as_u64(),
    })
}
