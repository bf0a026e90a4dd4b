// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use reqwest::Method;

use nifya_session::SessionConfig;

/// Command-line client for a NIFYA session.
#[derive(Debug, Parser)]
#[command(name = "nifya", version, about)]
pub struct Config {
    #[command(flatten)]
    pub session: SessionConfig,

    /// Log format (json or text).
    #[arg(long, env = "NIFYA_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "NIFYA_LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Log in and persist the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "NIFYA_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// End the session.
    Logout,
    /// Show the current session.
    Status,
    /// Force an access token refresh.
    Refresh,
    /// Send an authenticated request and print the response body.
    Request {
        /// HTTP method (GET, POST, ...).
        method: String,
        /// Path relative to the API URL.
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
    },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.session.validate()?;
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other} (expected json or text)"),
        }
        if let Command::Request { ref method, ref data, .. } = self.command {
            parse_method(method)?;
            if let Some(data) = data {
                parse_body(data)?;
            }
        }
        Ok(())
    }
}

pub fn parse_method(method: &str) -> anyhow::Result<Method> {
    let upper = method.to_ascii_uppercase();
    match upper.as_str() {
        "GET" | "POST" | "PUT" | "PATCH" | "DELETE" | "HEAD" | "OPTIONS" => {
            Ok(Method::from_bytes(upper.as_bytes())?)
        }
        _ => anyhow::bail!("unsupported method: {method}"),
    }
}

pub fn parse_body(data: &str) -> anyhow::Result<serde_json::Value> {
    serde_json::from_str(data).map_err(|e| anyhow::anyhow!("--data is not valid JSON: {e}"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
