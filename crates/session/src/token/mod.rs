// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer credentials: parsed tokens, the auth backend's token response, and
//! the persistent token store.

pub mod claims;
pub mod store;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Header scheme prefix for access tokens.
pub const BEARER_PREFIX: &str = "Bearer ";

/// One bearer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    /// Expiry as epoch seconds, from the payload's `exp` claim.
    expires_at: Option<u64>,
}

impl Token {
    /// Parse a raw token, reading its expiry claim on a best-effort basis.
    pub fn parse(value: impl Into<String>) -> Self {
        let value = value.into();
        let expires_at = claims::decode_unverified_claims(&value).and_then(|c| c.exp);
        Self { value, expires_at }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }
}

/// Token pair returned by `/login` and `/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl TokenResponse {
    /// Decode and shape-check a response body.
    pub fn from_body(body: &[u8]) -> Result<Self, AuthError> {
        let response: Self = serde_json::from_slice(body)
            .map_err(|e| AuthError::MalformedResponse(format!("token response: {e}")))?;
        if strip_bearer(&response.access_token).trim().is_empty() {
            return Err(AuthError::MalformedResponse("empty access_token".to_owned()));
        }
        if let Some(ty) = response.token_type.as_deref() {
            if !ty.eq_ignore_ascii_case("bearer") {
                return Err(AuthError::MalformedResponse(format!("unsupported token_type: {ty}")));
            }
        }
        Ok(response)
    }
}

/// Strip every leading `Bearer ` prefix. The scheme matches in any case.
pub fn strip_bearer(value: &str) -> &str {
    let mut rest = value.trim_start();
    while let Some(scheme) = rest.get(..BEARER_PREFIX.len()) {
        if !scheme.eq_ignore_ascii_case(BEARER_PREFIX) {
            break;
        }
        rest = rest[BEARER_PREFIX.len()..].trim_start();
    }
    rest.trim_end()
}

/// Rewrite a token so it carries exactly one `Bearer ` prefix.
pub fn normalize_bearer(value: &str) -> String {
    format!("{BEARER_PREFIX}{}", strip_bearer(value))
}

/// Current time as epoch seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
