// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Errors produced by the session coordinator.
///
/// `Clone` so that a single refresh outcome can be handed to every caller
/// waiting on the same in-flight refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no refresh token available")]
    NoRefreshToken,
    #[error("refresh token expired")]
    RefreshTokenExpired,
    #[error("refresh rejected ({status}): {message}")]
    RefreshRejected { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("auth backend error ({status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("login rejected ({status}): {message}")]
    LoginRejected { status: u16, message: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("invalid tokens: {0}")]
    InvalidTokens(String),
    #[error("session changed while the refresh was in flight")]
    SessionChanged,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether this failure ends the session (tokens cleared, expiry flag raised).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NoRefreshToken | Self::RefreshTokenExpired | Self::RefreshRejected { .. }
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NoRefreshToken => "NO_REFRESH_TOKEN",
            Self::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
            Self::RefreshRejected { .. } => "REFRESH_REJECTED",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Self::Network(_) => "NETWORK",
            Self::Upstream { .. } => "UPSTREAM",
            Self::LoginRejected { .. } => "LOGIN_REJECTED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Http { .. } => "HTTP",
            Self::InvalidTokens(_) => "INVALID_TOKENS",
            Self::SessionChanged => "SESSION_CHANGED",
            Self::Storage(_) => "STORAGE",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
