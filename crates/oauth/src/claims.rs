//! ID token claim extraction. Signatures are not checked: the resource server
//! verifies tokens, this client only reads them.

use {
    base64::{
        Engine,
        engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    },
    serde_json::{Map, Value},
};

use crate::{Error, Result};

/// Decoded ID token payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IdTokenClaims(Map<String, Value>);

impl IdTokenClaims {
    /// `exp`, seconds since the epoch.
    pub fn expires_at(&self) -> Option<u64> {
        self.0.get("exp").and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        })
    }

    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }

    pub fn get_str(&self, claim: &str) -> Option<&str> {
        self.0.get(claim).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Decode the payload segment of a compact JWT.
pub fn decode_claims(token: &str) -> Result<IdTokenClaims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload_b64), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(Error::message("malformed JWT: expected three segments"));
    };

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64.trim_end_matches('='))
        .or_else(|_| {
            let padded = match payload_b64.len() % 4 {
                2 => format!("{payload_b64}=="),
                3 => format!("{payload_b64}="),
                _ => payload_b64.to_string(),
            };
            STANDARD.decode(padded)
        })
        .map_err(|source| Error::external("malformed JWT payload encoding", source))?;

    match serde_json::from_slice(&payload)? {
        Value::Object(map) => Ok(IdTokenClaims(map)),
        _ => Err(Error::message("malformed JWT: payload is not a JSON object")),
    }
}
