// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session facade: one value per process wiring the token store, refresh
//! coordinator, request pipeline and observer together, plus login/logout.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::client::AuthClient;
use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::expiry::expires_in;
use crate::observer::{SessionEvent, SessionObserver};
use crate::refresh::RefreshCoordinator;
use crate::storage::{FileStore, KeyValueStore};
use crate::token::store::TokenStore;
use crate::token::{epoch_secs, TokenResponse};

/// Login endpoint, relative to the API base URL.
pub const LOGIN_PATH: &str = "/login";
/// Logout endpoint, relative to the API base URL.
pub const LOGOUT_PATH: &str = "/logout";

/// Snapshot of the session for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_expires_in_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in_secs: Option<u64>,
    pub has_refresh_token: bool,
    pub token_expired: bool,
    pub refreshing: bool,
}

pub struct Session {
    config: SessionConfig,
    http: reqwest::Client,
    store: Arc<TokenStore>,
    observer: Arc<SessionObserver>,
    coordinator: RefreshCoordinator,
    client: AuthClient,
}

impl Session {
    /// Build a session over `storage`, restoring any persisted tokens.
    pub fn open(config: SessionConfig, storage: Arc<dyn KeyValueStore>) -> Result<Self, AuthError> {
        config.validate().map_err(|e| AuthError::Internal(format!("invalid config: {e:#}")))?;
        crate::ensure_crypto_provider();
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AuthError::Internal(format!("http client: {e}")))?;

        let base_url = config.base_url().to_owned();
        let store = Arc::new(TokenStore::load(Arc::clone(&storage)));
        let observer = Arc::new(SessionObserver::new(storage));
        let coordinator = RefreshCoordinator::new(
            http.clone(),
            &base_url,
            Arc::clone(&store),
            Arc::clone(&observer),
            config.expiry_margin(),
        );
        let client = AuthClient::new(
            http.clone(),
            &base_url,
            Arc::clone(&store),
            coordinator.clone(),
            config.expiry_margin(),
        );

        debug!(api = %base_url, authenticated = store.is_authenticated(), "session opened");
        Ok(Self { config, http, store, observer, coordinator, client })
    }

    /// Open a session persisted in the config's state file.
    pub fn open_file(config: SessionConfig) -> Result<Self, AuthError> {
        let storage = Arc::new(FileStore::open(config.state_file()));
        Self::open(config, storage)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    /// Exchange credentials for a token pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionStatus, AuthError> {
        let resp = self
            .http
            .post(self.url(LOGIN_PATH))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "login rejected");
            return Err(if status.is_client_error() {
                AuthError::LoginRejected { status: status.as_u16(), message }
            } else {
                AuthError::Upstream { status: status.as_u16(), message }
            });
        }

        let body = resp.bytes().await?;
        let response = TokenResponse::from_body(&body)?;
        let tokens = self.store.save(&response, Some(email))?;
        if self.observer.consume() {
            debug!("cleared expiry flag left by a previous session");
        }

        info!(user_id = tokens.user_id.as_deref().unwrap_or("-"), "logged in");
        self.observer.emit(SessionEvent::LoggedIn { user_id: tokens.user_id });
        Ok(self.status())
    }

    /// End the session. Notifying the backend is best-effort; local state is
    /// always cleared.
    pub async fn logout(&self) {
        if let Some(authorization) = self.store.authorization_header() {
            let refresh = self.store.refresh_token().map(|t| t.value().to_owned());
            let result = self
                .http
                .post(self.url(LOGOUT_PATH))
                .header(reqwest::header::AUTHORIZATION, authorization)
                .json(&serde_json::json!({ "refresh_token": refresh }))
                .send()
                .await;
            match result {
                Ok(r) if r.status().is_success() => debug!("backend logout acknowledged"),
                Ok(r) => warn!(status = r.status().as_u16(), "backend logout failed"),
                Err(e) => warn!("backend logout failed: {e}"),
            }
        }

        self.store.clear();
        self.observer.emit(SessionEvent::LoggedOut);
        info!("logged out");
    }

    /// Refresh the access token (single-flight). Returns the new raw token.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        self.coordinator.refresh().await
    }

    /// Header-ready `Bearer <token>`, if logged in.
    pub fn access_token(&self) -> Option<String> {
        self.store.authorization_header()
    }

    pub fn status(&self) -> SessionStatus {
        let tokens = self.store.snapshot();
        let now = epoch_secs();
        SessionStatus {
            authenticated: self.store.is_authenticated(),
            user_id: tokens.user_id,
            email: tokens.email,
            access_expires_in_secs: tokens.access.as_ref().and_then(|t| expires_in(t, now)),
            refresh_expires_in_secs: tokens.refresh.as_ref().and_then(|t| expires_in(t, now)),
            has_refresh_token: tokens.refresh.is_some(),
            token_expired: self.observer.is_raised(),
            refreshing: self.coordinator.is_refreshing(),
        }
    }

    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    pub fn observer(&self) -> &SessionObserver {
        &self.observer
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.observer.events()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
