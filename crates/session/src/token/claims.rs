// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort claim extraction from a token payload.
//!
//! Nothing here verifies a signature. The values feed UX concerns only
//! (displaying the user, scheduling a refresh); the backend stays the sole
//! authority on whether a token is valid.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

/// Claims read from an unverified token payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UnverifiedClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Expiry as epoch seconds.
    #[serde(default, deserialize_with = "lenient_exp")]
    pub exp: Option<u64>,
}

/// Decode the middle segment of a `header.payload.signature` token WITHOUT
/// verifying it.
///
/// Accepts a leading `Bearer ` prefix and either base64 alphabet, with or
/// without padding. Returns `None` for anything that is not a three-part
/// token with a JSON object payload.
pub fn decode_unverified_claims(token: &str) -> Option<UnverifiedClaims> {
    let token = super::strip_bearer(token);
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        debug!("token is not a three-part structure");
        return None;
    };

    let payload = payload.trim_end_matches('=');
    let bytes = match URL_SAFE_NO_PAD.decode(payload) {
        Ok(b) => b,
        Err(_) => match STANDARD_NO_PAD.decode(payload) {
            Ok(b) => b,
            Err(e) => {
                debug!("token payload is not base64: {e}");
                return None;
            }
        },
    };

    match serde_json::from_slice::<UnverifiedClaims>(&bytes) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!("token payload is not a claims object: {e}");
            None
        }
    }
}

/// `exp` is numeric per RFC 7519, but some issuers emit floats or strings.
fn lenient_exp<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => {
            n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        }
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
#[path = "claims_tests.rs"]
mod tests;
