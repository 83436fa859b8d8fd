//! Cookie-less pending store.
//!
//! Nothing is written anywhere. When the provider sends the browser back, the
//! `state` it echoes in the address is read back as if it had been stored, so
//! redirect completion proceeds without first-party storage. The price: the
//! state is never compared against anything the client issued, and PKCE is
//! unavailable.

use std::sync::Arc;

use tracing::{debug, error};

use crate::{
    Result, callback::CallbackParams, host::Location, store::PendingStore,
    types::PendingAuthorization,
};

pub struct ReplayStore {
    location: Arc<dyn Location>,
}

impl ReplayStore {
    pub fn new(location: Arc<dyn Location>) -> Self {
        Self { location }
    }
}

impl PendingStore for ReplayStore {
    fn is_durable(&self) -> bool {
        false
    }

    fn save(&self, pending: &PendingAuthorization) -> Result<()> {
        debug!(state = %pending.state, "replay store does not persist pending requests");
        Ok(())
    }

    fn pending_state(&self, returned_state: &str) -> Result<Option<String>> {
        let replayed = CallbackParams::parse(&self.location.href())
            .state()
            .map(str::to_string)
            .unwrap_or_else(|| returned_state.to_string());
        Ok(Some(replayed))
    }

    fn pending_verifier(&self, state: &str) -> Result<Option<String>> {
        error!(
            state,
            "PKCE verifier requested from the replay store, which never holds one"
        );
        Ok(None)
    }

    fn discard(&self, _state: &str) -> Result<()> {
        Ok(())
    }
}
