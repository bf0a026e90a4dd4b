// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subcommand execution. Each command returns a process exit code.

use std::io::Write;

use anyhow::Context;
use tracing::debug;

use nifya_session::{ApiRequest, Session};

use crate::config::{parse_body, parse_method, Command, Config};

/// Open the persisted session and run the selected command.
pub async fn run(config: Config) -> anyhow::Result<i32> {
    let session = Session::open_file(config.session.clone()).context("failed to open session")?;
    debug!(state = %config.session.state_file().display(), "session state");
    execute(&session, &config.command, &mut std::io::stdout()).await
}

pub async fn execute<W: Write>(session: &Session, command: &Command, out: &mut W) -> anyhow::Result<i32> {
    match command {
        Command::Login { email, password } => {
            session.login(email, password).await.context("login failed")?;
            print_status(session, out)?;
        }
        Command::Logout => {
            session.logout().await;
            writeln!(out, "Logged out.")?;
        }
        Command::Status => {
            print_status(session, out)?;
            // This command is the consumer of the expiry flag.
            if session.observer().consume() {
                writeln!(out, "Session expired; log in again.")?;
            }
        }
        Command::Refresh => {
            session.refresh().await.context("refresh failed")?;
            print_status(session, out)?;
        }
        Command::Request { method, path, data } => {
            let mut request = ApiRequest::new(parse_method(method)?, path.clone());
            if let Some(data) = data {
                request = request.json(parse_body(data)?);
            }
            let resp = session.client().execute(request).await.context("request failed")?;
            let status = resp.status();
            let body = resp.text().await.context("failed to read response body")?;
            writeln!(out, "{body}")?;
            if !status.is_success() {
                debug!(status = status.as_u16(), "request returned error status");
                return Ok(1);
            }
        }
    }
    Ok(0)
}

fn print_status<W: Write>(session: &Session, out: &mut W) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&session.status())?;
    writeln!(out, "{json}")?;
    Ok(())
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
