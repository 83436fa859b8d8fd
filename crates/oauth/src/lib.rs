//! OpenID Connect authorization code client.
//!
//! The host supplies its address bar ([`Location`]), a way to leave the page
//! ([`Navigator`]) and a place to remember the pending request
//! ([`PendingStore`]). [`AuthSession`] drives the rest.

pub mod callback;
pub mod claims;
pub mod discovery;
pub mod error;
pub mod events;
pub mod flow;
pub mod host;
pub mod pkce;
pub mod renewal;
pub mod session;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod store_replay;
pub mod token;
pub mod types;

pub use {
    callback::{CallbackParams, ParamLocation},
    claims::{IdTokenClaims, decode_claims},
    discovery::{Discovery, ProviderConfiguration, fetch_configuration},
    events::{AuthEvent, EventFn},
    host::{Location, MemoryLocation, Navigator, RecordingNavigator},
    session::AuthSession,
    store::{DurableStore, KeyValueStore, PendingStore},
    store_file::FileStore,
    store_memory::MemoryStore,
    store_replay::ReplayStore,
    types::{AuthState, ClientConfig, ClientIdentity, OidcConfig, PendingAuthorization, TokenSet},
};

pub use error::{Error, Result};
