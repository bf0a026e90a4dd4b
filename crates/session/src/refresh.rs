// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight access token refresh.
//!
//! The first caller spawns a refresh task and parks a shared handle to its
//! outcome in `in_flight`; every caller arriving before it settles awaits
//! that same handle, so concurrent 401s produce exactly one `/refresh` call
//! and one shared result. The task clears the slot itself, after the token
//! store has been updated, so later callers never observe a stale pair.
//!
//! A flight is tied to the session generation it started in. If the user
//! logs in or out while it is out, its outcome is dropped and waiters get
//! [`AuthError::SessionChanged`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::expiry::is_expired;
use crate::observer::{SessionEvent, SessionObserver};
use crate::token::store::TokenStore;
use crate::token::TokenResponse;

/// Refresh endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "/refresh";

type RefreshOutcome = Shared<BoxFuture<'static, Result<String, AuthError>>>;

struct RefreshFlight {
    generation: u64,
    outcome: RefreshOutcome,
}

/// Coordinates refreshes of the session's access token.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    refresh_url: String,
    store: Arc<TokenStore>,
    observer: Arc<SessionObserver>,
    margin: Duration,
    in_flight: Mutex<Option<RefreshFlight>>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        store: Arc<TokenStore>,
        observer: Arc<SessionObserver>,
        margin: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                refresh_url: format!("{base_url}{REFRESH_PATH}"),
                store,
                observer,
                margin,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Refresh the access token, joining any refresh already in flight.
    ///
    /// Returns the new raw access token. Every caller that joined the same
    /// flight receives the same result.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let generation = self.inner.store.generation();
        let outcome = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(flight) if flight.generation == generation => {
                    debug!("joining in-flight refresh");
                    flight.outcome.clone()
                }
                _ => {
                    let inner = Arc::clone(&self.inner);
                    let task = tokio::spawn(async move {
                        let result = inner.run(generation).await;
                        let mut slot = inner.in_flight.lock();
                        if slot.as_ref().is_some_and(|f| f.generation == generation) {
                            *slot = None;
                        }
                        result
                    });
                    let outcome = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(AuthError::Internal(format!("refresh task failed: {e}")))
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some(RefreshFlight { generation, outcome: outcome.clone() });
                    outcome
                }
            }
        };
        outcome.await
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }
}

impl Inner {
    async fn run(&self, generation: u64) -> Result<String, AuthError> {
        let result = self.attempt(generation).await;
        match result {
            Ok(_) => info!("access token refreshed"),
            Err(AuthError::SessionChanged) => {
                info!("session changed during refresh, new tokens discarded");
            }
            Err(ref e) if e.is_terminal() => {
                if !self.end_session(generation, e) {
                    info!(code = e.code(), "session changed during refresh, failure ignored: {e}");
                    return Err(AuthError::SessionChanged);
                }
                warn!(code = e.code(), "refresh failed, session ended: {e}");
            }
            Err(ref e) => warn!(code = e.code(), "refresh failed, session kept: {e}"),
        }
        result
    }

    async fn attempt(&self, generation: u64) -> Result<String, AuthError> {
        let refresh_token = self.store.refresh_token_for(generation)?.ok_or(AuthError::NoRefreshToken)?;
        if is_expired(&refresh_token, self.margin) {
            return Err(AuthError::RefreshTokenExpired);
        }

        let response = request_refresh(&self.http, &self.refresh_url, refresh_token.value()).await?;
        let tokens = self.store.save_refreshed(&response, generation)?;
        let access = tokens
            .access
            .map(|t| t.value().to_owned())
            .ok_or_else(|| AuthError::Internal("token store lost access token".to_owned()))?;
        self.observer.emit(SessionEvent::Refreshed { user_id: tokens.user_id });
        Ok(access)
    }

    /// Clear the session the refresh started from. A login or logout since
    /// then wins, and nothing is cleared.
    fn end_session(&self, generation: u64, err: &AuthError) -> bool {
        if !self.store.clear_if_current(generation) {
            return false;
        }
        self.observer.raise();
        self.observer.emit(SessionEvent::Expired { reason: err.to_string() });
        true
    }
}

/// Perform a single refresh request.
///
/// 4xx means the backend refused the refresh token; 5xx is treated as a
/// transient backend failure.
pub async fn request_refresh(
    client: &reqwest::Client,
    refresh_url: &str,
    refresh_token: &str,
) -> Result<TokenResponse, AuthError> {
    let resp = client
        .post(refresh_url)
        .json(&serde_json::json!({ "refresh_token": refresh_token }))
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(if status.is_client_error() {
            AuthError::RefreshRejected { status: status.as_u16(), message }
        } else {
            AuthError::Upstream { status: status.as_u16(), message }
        });
    }

    let body = resp.bytes().await?;
    TokenResponse::from_body(&body)
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
