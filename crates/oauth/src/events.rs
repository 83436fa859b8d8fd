use std::sync::{Arc, RwLock};

use crate::{Error, claims::IdTokenClaims};

/// Notifications emitted by [`AuthSession`](crate::AuthSession).
#[derive(Debug)]
pub enum AuthEvent {
    /// A fresh access token, or `None` once logout completes.
    AccessToken(Option<String>),
    /// The raw ID token and its claims, when they could be decoded.
    IdToken {
        raw: String,
        claims: Option<IdTokenClaims>,
    },
    Logout,
    Error(Error),
}

/// Callback receiving session events.
pub type EventFn = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

/// Registered listeners, called in registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    listeners: RwLock<Vec<EventFn>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: EventFn) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    pub(crate) fn emit(&self, event: &AuthEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::sync::Mutex};

    #[test]
    fn listeners_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::default();
        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            listeners.add(Arc::new(move |event: &AuthEvent| {
                if matches!(event, AuthEvent::Logout) {
                    seen.lock().unwrap_or_else(|e| e.into_inner()).push(tag);
                }
            }));
        }

        listeners.emit(&AuthEvent::Logout);
        listeners.emit(&AuthEvent::AccessToken(None));
        assert_eq!(*seen.lock().unwrap_or_else(|e| e.into_inner()), vec!["a", "b"]);
    }
}
