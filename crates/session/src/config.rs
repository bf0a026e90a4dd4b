// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Settings for the session coordinator.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Base URL of the NIFYA REST backend (`/login`, `/refresh`, `/logout` live under it).
    #[arg(long, default_value = "http://127.0.0.1:3000/api", env = "NIFYA_API_URL")]
    pub api_url: String,

    /// Timeout for every HTTP call, in milliseconds.
    #[arg(long, default_value_t = 30000, env = "NIFYA_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Seconds before literal expiry at which a token is treated as expired.
    #[arg(long, default_value_t = 60, env = "NIFYA_EXPIRY_MARGIN_SECS")]
    pub expiry_margin_secs: u64,

    /// Directory holding persisted session state.
    #[arg(long, env = "NIFYA_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000/api".to_owned(),
            request_timeout_ms: 30000,
            expiry_margin_secs: 60,
            state_dir: None,
        }
    }
}

impl SessionConfig {
    /// Config pointed at `api_url` with default settings.
    pub fn for_api(api_url: impl Into<String>) -> Self {
        Self { api_url: api_url.into(), ..Self::default() }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let url = self.api_url.trim();
        if url.is_empty() {
            anyhow::bail!("--api-url must not be empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("--api-url must be an http(s) URL: {url}");
        }
        if self.request_timeout_ms == 0 {
            anyhow::bail!("--request-timeout-ms must be greater than zero");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn expiry_margin(&self) -> Duration {
        Duration::from_secs(self.expiry_margin_secs)
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api_url.trim().trim_end_matches('/')
    }

    /// Path of the session state file.
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(crate::storage::state_dir).join("session.json")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
