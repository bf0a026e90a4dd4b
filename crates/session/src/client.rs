// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request pipeline.
//!
//! Every request carries the current `Authorization` header (and `x-user-id`
//! when known). A 401 triggers one refresh through the [`RefreshCoordinator`]
//! and a single reissue; a second 401 is returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::expiry::is_expired;
use crate::refresh::RefreshCoordinator;
use crate::token::normalize_bearer;
use crate::token::store::TokenStore;

/// Header carrying the subject extracted from the access token.
pub const USER_ID_HEADER: &str = "x-user-id";

/// A request against the NIFYA API, kept in parts so it can be reissued.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/subscriptions`.
    pub path: String,
    pub body: Option<serde_json::Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, retried: false }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether this request has already been reissued after a 401.
    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

/// Credentials attached to one send.
struct AuthSnapshot {
    access: Option<String>,
    user_id: Option<String>,
}

/// HTTP client that authenticates every call and refreshes on 401.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<TokenStore>,
    coordinator: RefreshCoordinator,
    margin: Duration,
}

impl AuthClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        store: Arc<TokenStore>,
        coordinator: RefreshCoordinator,
        margin: Duration,
    ) -> Self {
        Self { http, base_url: base_url.to_owned(), store, coordinator, margin }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn snapshot(&self) -> AuthSnapshot {
        let tokens = self.store.snapshot();
        AuthSnapshot { access: tokens.access.map(|t| t.value().to_owned()), user_id: tokens.user_id }
    }

    /// Refresh ahead of sending when the access token is already expired and
    /// a refresh token is available.
    async fn refresh_if_expired(&self) -> Result<(), AuthError> {
        let tokens = self.store.snapshot();
        let Some(access) = tokens.access else {
            return Ok(());
        };
        if tokens.refresh.is_some() && is_expired(&access, self.margin) {
            debug!("access token expired, refreshing before send");
            self.coordinator.refresh().await?;
        }
        Ok(())
    }

    async fn send(
        &self,
        request: &ApiRequest,
        auth: &AuthSnapshot,
    ) -> Result<reqwest::Response, AuthError> {
        let mut builder = self.http.request(request.method.clone(), self.url(&request.path));
        if let Some(ref access) = auth.access {
            builder = builder.header(reqwest::header::AUTHORIZATION, normalize_bearer(access));
        }
        if let Some(ref user_id) = auth.user_id {
            builder = builder.header(USER_ID_HEADER, user_id);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    /// Send `request` with credentials, refreshing and retrying once on 401.
    ///
    /// Non-401 responses are returned as-is, whatever their status.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<reqwest::Response, AuthError> {
        self.refresh_if_expired().await?;
        loop {
            let auth = self.snapshot();
            let resp = self.send(&request, &auth).await?;
            if resp.status() != StatusCode::UNAUTHORIZED {
                return Ok(resp);
            }

            if request.retried {
                warn!(path = %request.path, "request still unauthorized after refresh");
                return Err(AuthError::Unauthorized(format!(
                    "{} {} rejected after token refresh",
                    request.method, request.path
                )));
            }
            request.retried = true;

            // Anonymous call with nothing to refresh: not an expired session.
            if auth.access.is_none() && self.store.refresh_token().is_none() {
                return Err(AuthError::Unauthorized(format!(
                    "{} {} requires login",
                    request.method, request.path
                )));
            }

            // Another caller may have refreshed while this request was out.
            let current = self.store.access_token().map(|t| t.value().to_owned());
            // The session ended while this request was out; that failure
            // has already been reported.
            if auth.access.is_some() && current.is_none() {
                return Err(AuthError::Unauthorized(format!(
                    "{} {} rejected and the session has ended",
                    request.method, request.path
                )));
            }
            if current.is_some() && current != auth.access {
                debug!(path = %request.path, "token changed since send, retrying");
                continue;
            }

            debug!(path = %request.path, "unauthorized, refreshing token");
            if let Err(e) = self.coordinator.refresh().await {
                return Err(AuthError::Unauthorized(format!(
                    "{} {} rejected and refresh failed: {e}",
                    request.method, request.path
                )));
            }
        }
    }

    /// Execute and decode a JSON response body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, AuthError> {
        let resp = self.execute(request).await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AuthError::Http { status: status.as_u16(), message });
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| AuthError::MalformedResponse(e.to_string()))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthError> {
        self.send_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, AuthError> {
        self.send_json(ApiRequest::post(path).json(body)).await
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
