// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session token coordination for the NIFYA API.
//!
//! Keeps the access/refresh token pair persisted, authenticates outbound
//! requests, refreshes expired tokens with a single in-flight refresh shared
//! by all callers, and raises a forced-logout signal when the session cannot
//! be recovered.

pub mod client;
pub mod config;
pub mod error;
pub mod expiry;
pub mod observer;
pub mod refresh;
pub mod session;
pub mod storage;
pub mod test_support;
pub mod token;

use std::sync::Once;

pub use crate::client::{ApiRequest, AuthClient};
pub use crate::config::SessionConfig;
pub use crate::error::AuthError;
pub use crate::observer::{SessionEvent, SessionObserver};
pub use crate::session::{Session, SessionStatus};
pub use crate::storage::{FileStore, KeyValueStore, MemoryStore};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls (needed even on plain
/// HTTP). Only the first call has effect.
pub fn ensure_crypto_provider() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
