use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// Discovery runs once and its outcome is shared by every awaiter.
    #[error("provider discovery failed: {0}")]
    Discovery(Arc<Error>),

    #[error("authorization failed: {error}{}", describe(.description))]
    Authorization {
        error: String,
        description: Option<String>,
    },

    #[error("no pending authorization request matches state {state:?}")]
    InvalidState { state: String },

    #[error("pending authorization request for state {state:?} has expired")]
    PendingExpired { state: String },

    #[error("no refresh token held")]
    MissingRefreshToken,

    #[error("token endpoint returned HTTP {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error(
        "requested token headroom of {min_validity_secs}s is unattainable: token lifetime is {lifetime_secs}s"
    )]
    HeadroomUnattainable {
        lifetime_secs: i64,
        min_validity_secs: u64,
    },

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn authorization(error: impl Into<String>, description: Option<String>) -> Self {
        Self::Authorization {
            error: error.into(),
            description,
        }
    }

    #[must_use]
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_error_includes_description() {
        let err = Error::authorization("access_denied", Some("user cancelled".into()));
        assert_eq!(
            err.to_string(),
            "authorization failed: access_denied (user cancelled)"
        );

        let err = Error::authorization("access_denied", None);
        assert_eq!(err.to_string(), "authorization failed: access_denied");
    }

    #[test]
    fn discovery_error_wraps_shared_cause() {
        let err = Error::Discovery(Arc::new(Error::message("HTTP 404")));
        assert_eq!(err.to_string(), "provider discovery failed: HTTP 404");
    }
}
