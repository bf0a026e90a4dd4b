// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers shared by unit and integration tests.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;

use crate::storage::{KeyValueStore, MemoryStore};
use crate::token::epoch_secs;

/// Build an unsigned `header.payload.signature` token around `claims`.
pub fn unsigned_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2ln")
}

/// Token for `sub` expiring `offset_secs` from now (negative = already expired).
pub fn token_expiring_in(sub: &str, offset_secs: i64) -> String {
    let exp = epoch_secs().saturating_add_signed(offset_secs);
    unsigned_token(&serde_json::json!({ "sub": sub, "exp": exp }))
}

/// Memory-backed store whose writes to one key can be made to fail.
///
/// Batches go through the trait's default `apply`, so a failure midway
/// exercises the restore path.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<Option<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `set` or `remove` of `key` fail.
    pub fn fail_writes_to(&self, key: &str) {
        *self.failing.lock() = Some(key.to_owned());
    }

    fn check(&self, key: &str) -> std::io::Result<()> {
        match self.failing.lock().as_deref() {
            Some(failing) if failing == key => Err(std::io::Error::other("disk full")),
            _ => Ok(()),
        }
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        self.check(key)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        self.check(key)?;
        self.inner.remove(key)
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
