use url::Url;

use crate::{
    Error, Result,
    discovery::ProviderConfiguration,
    pkce::{PkceChallenge, generate_pkce, generate_state},
    types::{ClientConfig, PendingAuthorization},
};

/// Result of building an authorization request.
#[derive(Debug)]
pub struct AuthorizationRequest {
    pub url: String,
    pub pending: PendingAuthorization,
}

/// Build the authorization endpoint URL.
///
/// With `use_pkce` a fresh S256 challenge is attached and its verifier kept
/// in the returned [`PendingAuthorization`].
pub fn build_authorization_request(
    provider: &ProviderConfiguration,
    client: &ClientConfig,
    redirect_uri: &str,
    use_pkce: bool,
) -> Result<AuthorizationRequest> {
    let pkce = use_pkce.then(generate_pkce);
    let state = generate_state();
    let url = authorization_url(provider, client, redirect_uri, &state, pkce.as_ref())?.to_string();

    Ok(AuthorizationRequest {
        url,
        pending: PendingAuthorization::new(state, pkce.map(|p| p.verifier)),
    })
}

fn authorization_url(
    provider: &ProviderConfiguration,
    client: &ClientConfig,
    redirect_uri: &str,
    state: &str,
    pkce: Option<&PkceChallenge>,
) -> Result<Url> {
    let mut url = Url::parse(&provider.authorization_endpoint).map_err(|source| {
        Error::external(
            format!(
                "invalid authorization_endpoint {}",
                provider.authorization_endpoint
            ),
            source,
        )
    })?;

    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &client.identity.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &client.scope)
        .append_pair("state", state);

    if let Some(pkce) = pkce {
        url.query_pairs_mut()
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");
    }

    for (key, value) in &client.extras {
        url.query_pairs_mut().append_pair(key, value);
    }

    Ok(url)
}
