// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session observer: the forced-logout signal and session lifecycle events.
//!
//! The `token_expired` flag lives in persistent storage so that a consumer in
//! another process (or a later run) still sees it. It is mirrored in a
//! `watch` channel so in-process consumers are woken as soon as it is raised.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, TOKEN_EXPIRED_KEY};

/// Lifecycle notifications emitted by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    LoggedIn { user_id: Option<String> },
    Refreshed { user_id: Option<String> },
    /// The session ended without the user asking for it.
    Expired { reason: String },
    LoggedOut,
}

pub struct SessionObserver {
    storage: Arc<dyn KeyValueStore>,
    flag: watch::Sender<bool>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionObserver {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let raised = storage.get(TOKEN_EXPIRED_KEY).is_some_and(|v| v == "true");
        let (flag, _) = watch::channel(raised);
        let (event_tx, _) = broadcast::channel(64);
        Self { storage, flag, event_tx }
    }

    /// Raise the expiry flag. Returns `false` if it was already raised.
    pub fn raise(&self) -> bool {
        let changed = self.flag.send_if_modified(|raised| {
            if *raised {
                return false;
            }
            *raised = true;
            true
        });
        if changed {
            if let Err(e) = self.storage.set(TOKEN_EXPIRED_KEY, "true") {
                warn!("failed to persist expiry flag: {e}");
            }
            debug!("session expiry flag raised");
        }
        changed
    }

    /// Clear the expiry flag. Returns whether it was raised.
    pub fn consume(&self) -> bool {
        let changed = self.flag.send_if_modified(|raised| {
            if !*raised {
                return false;
            }
            *raised = false;
            true
        });
        if changed {
            if let Err(e) = self.storage.remove(TOKEN_EXPIRED_KEY) {
                warn!("failed to clear expiry flag: {e}");
            }
            debug!("session expiry flag consumed");
        }
        changed
    }

    pub fn is_raised(&self) -> bool {
        *self.flag.borrow()
    }

    /// Watch the flag. The receiver sees the current value immediately.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }

    /// Resolve once the flag is raised (immediately if it already is).
    pub async fn wait_for_expiry(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this only fails if we are gone.
        let _ = rx.wait_for(|raised| *raised).await;
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        debug!(?event, "session event");
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
