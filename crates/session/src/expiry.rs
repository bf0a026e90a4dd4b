// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token usability decisions.

use std::time::Duration;

use crate::token::{epoch_secs, Token};

/// Default safety margin before literal expiry.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Whether `token` should be treated as expired now.
///
/// A token without a known expiry is never expired. That keeps tokens of an
/// unexpected shape usable, but it also means they are never proactively
/// refreshed; the backend's 401 is the only signal for them.
pub fn is_expired(token: &Token, margin: Duration) -> bool {
    is_expired_at(token, margin, epoch_secs())
}

/// [`is_expired`] against an explicit clock (epoch seconds).
pub fn is_expired_at(token: &Token, margin: Duration, now: u64) -> bool {
    match token.expires_at() {
        Some(exp) => now >= exp.saturating_sub(margin.as_secs()),
        None => false,
    }
}

/// Seconds until literal expiry, saturating at zero. `None` if unknown.
pub fn expires_in(token: &Token, now: u64) -> Option<u64> {
    token.expires_at().map(|exp| exp.saturating_sub(now))
}

#[cfg(test)]
#[path = "expiry_tests.rs"]
mod tests;
