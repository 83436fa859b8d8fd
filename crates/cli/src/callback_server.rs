use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, Result, bail},
    axum::{Router, extract::RawQuery, response::Html, routing::get},
    tokio::{net::TcpListener, sync::oneshot},
    tracing::{debug, info},
    url::Url,
};

/// One-shot loopback server that receives the provider's redirect.
pub struct CallbackServer {
    listener: TcpListener,
    redirect_uri: Url,
}

impl CallbackServer {
    /// Bind to the host and port of `redirect_uri`. Binding happens before the
    /// browser is sent away, so the redirect cannot arrive too early.
    pub async fn bind(redirect_uri: &str) -> Result<Self> {
        let redirect_uri = Url::parse(redirect_uri)
            .with_context(|| format!("invalid redirect URI {redirect_uri}"))?;
        if redirect_uri.scheme() != "http" {
            bail!("redirect URI must use http for the loopback callback server");
        }
        let host = redirect_uri
            .host_str()
            .context("redirect URI has no host")?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = redirect_uri
            .port_or_known_default()
            .context("redirect URI has no port")?;

        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .with_context(|| format!("failed to bind callback server on {host}:{port}"))?;
        info!(addr = %listener.local_addr()?, path = redirect_uri.path(), "callback server listening");

        Ok(Self {
            listener,
            redirect_uri,
        })
    }

    /// Wait for the redirect and return the full address the browser was
    /// sent to.
    pub async fn wait_for_redirect(self, timeout: Duration) -> Result<String> {
        let (tx, rx) = oneshot::channel::<String>();
        let tx = Arc::new(std::sync::Mutex::new(Some(tx)));
        let base = self.redirect_uri.clone();

        let app = Router::new().route(
            self.redirect_uri.path(),
            get(move |RawQuery(query): RawQuery| {
                let tx = tx.lock().unwrap_or_else(|e| e.into_inner()).take();
                let href = redirect_href(&base, query.as_deref());
                async move {
                    debug!("redirect received");
                    if let Some(tx) = tx {
                        let _ = tx.send(href);
                    }
                    Html(
                        "<h1>Redirect received</h1><p>You can close this window and return to the terminal.</p>"
                            .to_string(),
                    )
                }
            }),
        );

        let server = axum::serve(self.listener, app);

        tokio::select! {
            result = rx => {
                Ok(result?)
            }
            _ = server.into_future() => {
                bail!("callback server exited unexpectedly")
            }
            _ = tokio::time::sleep(timeout) => {
                bail!("no redirect received within {} seconds", timeout.as_secs())
            }
        }
    }
}

/// The redirect URI with the query the provider appended.
fn redirect_href(base: &Url, query: Option<&str>) -> String {
    let mut href = base.clone();
    href.set_fragment(None);
    href.set_query(query.filter(|q| !q.is_empty()));
    href.to_string()
}
