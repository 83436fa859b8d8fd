//! Storage for the request state that must survive the round trip to the
//! identity provider.
//!
//! Two layers: [`KeyValueStore`] is the raw backend (memory, file, browser
//! storage), and [`PendingStore`] is what the session talks to. A durable
//! backend is wrapped in [`DurableStore`]; the cookie-less mode uses
//! [`ReplayStore`](crate::store_replay::ReplayStore), which implements
//! [`PendingStore`] directly.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    Error, Result,
    types::{PendingAuthorization, now_secs},
};

/// Minimal string key/value backend.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn keys(&self) -> Result<Vec<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Where pending authorization requests live between redirects.
pub trait PendingStore: Send + Sync {
    /// Whether writes survive the redirect. PKCE is only used when they do.
    fn is_durable(&self) -> bool;

    /// Persist the request issued by `login()`.
    fn save(&self, pending: &PendingAuthorization) -> Result<()>;

    /// The CSRF state recorded for the `state` the provider returned.
    fn pending_state(&self, returned_state: &str) -> Result<Option<String>>;

    /// The PKCE verifier recorded for `state`.
    fn pending_verifier(&self, state: &str) -> Result<Option<String>>;

    /// Drop the request for `state` once it has been consumed.
    fn discard(&self, state: &str) -> Result<()>;
}

const PENDING_PREFIX: &str = "wicket.pending.";

/// [`PendingStore`] over a durable [`KeyValueStore`]. Each request is stored
/// as JSON under `wicket.pending.<state>`.
#[derive(Clone)]
pub struct DurableStore {
    backend: Arc<dyn KeyValueStore>,
}

impl DurableStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    fn key(state: &str) -> String {
        format!("{PENDING_PREFIX}{state}")
    }

    fn load(&self, state: &str) -> Result<Option<PendingAuthorization>> {
        let Some(raw) = self.backend.get(&Self::key(state)) else {
            debug!(state, "no pending authorization request");
            return Ok(None);
        };
        let pending: PendingAuthorization = serde_json::from_str(&raw)?;
        if pending.is_expired(now_secs()) {
            warn!(state, "pending authorization request expired");
            self.backend.remove(&Self::key(state))?;
            return Err(Error::PendingExpired {
                state: state.to_string(),
            });
        }
        Ok(Some(pending))
    }

    /// Drop pending requests older than their TTL, such as those left by
    /// abandoned logins. Entries that do not parse are left alone.
    fn sweep_expired(&self) -> Result<()> {
        let now = now_secs();
        for key in self.backend.keys()? {
            if !key.starts_with(PENDING_PREFIX) {
                continue;
            }
            let expired = self
                .backend
                .get(&key)
                .and_then(|raw| serde_json::from_str::<PendingAuthorization>(&raw).ok())
                .is_some_and(|pending| pending.is_expired(now));
            if expired {
                debug!(key, "sweeping expired pending authorization request");
                self.backend.remove(&key)?;
            }
        }
        Ok(())
    }
}

impl PendingStore for DurableStore {
    fn is_durable(&self) -> bool {
        true
    }

    fn save(&self, pending: &PendingAuthorization) -> Result<()> {
        if let Err(e) = self.sweep_expired() {
            warn!(error = %e, "failed to sweep expired pending requests");
        }
        let raw = serde_json::to_string(pending)?;
        self.backend.set(&Self::key(&pending.state), &raw)
    }

    fn pending_state(&self, returned_state: &str) -> Result<Option<String>> {
        Ok(self.load(returned_state)?.map(|p| p.state))
    }

    fn pending_verifier(&self, state: &str) -> Result<Option<String>> {
        Ok(self.load(state)?.and_then(|p| p.code_verifier))
    }

    fn discard(&self, state: &str) -> Result<()> {
        self.backend.remove(&Self::key(state))
    }
}
