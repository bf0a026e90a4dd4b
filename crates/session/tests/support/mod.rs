// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process mock of the NIFYA auth backend.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use nifya_session::test_support::unsigned_token;
use nifya_session::token::epoch_secs;

pub const USER_ID: &str = "user-42";
pub const PASSWORD: &str = "hunter2";

/// Knobs for a [`MockBackend`].
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Delay before `/refresh` answers.
    pub refresh_delay: Duration,
    /// Lifetime of issued access tokens.
    pub access_ttl_secs: i64,
    /// Force `/refresh` to answer with this status.
    pub refresh_status: Option<u16>,
    pub logout_status: u16,
    /// `/protected` rejects every token.
    pub reject_all: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            refresh_delay: Duration::ZERO,
            access_ttl_secs: 3600,
            refresh_status: None,
            logout_status: 200,
            reject_all: false,
        }
    }
}

#[derive(Default)]
struct Calls {
    login: AtomicU32,
    refresh: AtomicU32,
    logout: AtomicU32,
    protected: AtomicU32,
}

struct BackendState {
    opts: BackendOptions,
    calls: Calls,
    issued: AtomicU32,
    access: Mutex<Option<String>>,
    refresh: Mutex<Option<String>>,
    seen_user_ids: Mutex<Vec<Option<String>>>,
}

impl BackendState {
    /// Issue a fresh pair that `ttl_secs` from now stops being accepted
    /// client-side. The backend only honours the latest pair.
    fn issue(&self, email: Option<&str>, ttl_secs: i64) -> (String, String) {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let exp = epoch_secs().saturating_add_signed(ttl_secs);
        let mut claims = json!({ "sub": USER_ID, "exp": exp, "n": n });
        if let Some(email) = email {
            claims["email"] = json!(email);
        }
        let access = unsigned_token(&claims);
        let refresh = format!("refresh-{n}");
        *self.access.lock() = Some(access.clone());
        *self.refresh.lock() = Some(refresh.clone());
        (access, refresh)
    }
}

fn pair_body(access: String, refresh: String) -> Json<Value> {
    Json(json!({ "access_token": access, "refresh_token": refresh, "token_type": "bearer" }))
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

// -- Handlers -----------------------------------------------------------------

async fn login(State(s): State<Arc<BackendState>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    s.calls.login.fetch_add(1, Ordering::SeqCst);
    if body["password"] != PASSWORD {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid credentials" })));
    }
    let (access, refresh) = s.issue(body["email"].as_str(), s.opts.access_ttl_secs);
    (StatusCode::OK, pair_body(access, refresh))
}

async fn refresh(State(s): State<Arc<BackendState>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    s.calls.refresh.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(s.opts.refresh_delay).await;
    if let Some(code) = s.opts.refresh_status {
        return (status(code), Json(json!({ "error": "forced" })));
    }
    let current = s.refresh.lock().clone();
    if current.is_none() || body["refresh_token"].as_str() != current.as_deref() {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_grant" })));
    }
    let (access, refresh) = s.issue(None, s.opts.access_ttl_secs);
    (StatusCode::OK, pair_body(access, refresh))
}

async fn logout(State(s): State<Arc<BackendState>>) -> StatusCode {
    s.calls.logout.fetch_add(1, Ordering::SeqCst);
    status(s.opts.logout_status)
}

async fn protected(State(s): State<Arc<BackendState>>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    s.calls.protected.fetch_add(1, Ordering::SeqCst);
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
    s.seen_user_ids.lock().push(header("x-user-id"));

    let expected = s.access.lock().as_ref().map(|a| format!("Bearer {a}"));
    if s.opts.reject_all || expected.is_none() || header("authorization") != expected {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })));
    }
    (StatusCode::OK, Json(json!({ "ok": true })))
}

// -- Backend ------------------------------------------------------------------

pub struct MockBackend {
    pub addr: SocketAddr,
    state: Arc<BackendState>,
}

impl MockBackend {
    pub async fn start(opts: BackendOptions) -> anyhow::Result<Self> {
        let state = Arc::new(BackendState {
            opts,
            calls: Calls::default(),
            issued: AtomicU32::new(0),
            access: Mutex::new(None),
            refresh: Mutex::new(None),
            seen_user_ids: Mutex::new(Vec::new()),
        });

        let api = Router::new()
            .route("/login", post(login))
            .route("/refresh", post(refresh))
            .route("/logout", post(logout))
            .route("/protected", get(protected))
            .with_state(Arc::clone(&state));
        let app = Router::new().nest("/api", api);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok(Self { addr, state })
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Issue a pair server-side, as if a login happened in an earlier run.
    pub fn seed(&self, access_ttl_secs: i64) -> (String, String) {
        self.state.issue(None, access_ttl_secs)
    }

    /// Stop accepting the current access token while keeping the refresh token.
    pub fn revoke_access(&self) {
        *self.state.access.lock() = Some("revoked".to_owned());
    }

    pub fn login_calls(&self) -> u32 {
        self.state.calls.login.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.calls.refresh.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> u32 {
        self.state.calls.logout.load(Ordering::SeqCst)
    }

    pub fn protected_calls(&self) -> u32 {
        self.state.calls.protected.load(Ordering::SeqCst)
    }

    pub fn seen_user_ids(&self) -> Vec<Option<String>> {
        self.state.seen_user_ids.lock().clone()
    }
}
