mod admissions;
mod attendance;
mod calc;
mod cascade;
mod clock;
mod config;
mod db;
mod error;
mod finance;
mod guard;
mod ipc;
mod model;
mod notices;
mod pdf;
mod report;
mod results;
mod scope;
mod store;
mod students;
mod telemetry;
mod users;

use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let config = config::Config::parse();
    telemetry::init_tracing(config.log_json, config.log_level);

    let mut state = ipc::AppState::new();
    if let Some(path) = &config.workspace {
        ipc::select_workspace(&mut state, path)
            .with_context(|| format!("open workspace {}", path.display()))?;
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "schoold ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // Echo the id when the line is JSON but not a valid request.
                let id = serde_json::from_str::<serde_json::Value>(&line)
                    .ok()
                    .and_then(|v| v.get("id").and_then(|i| i.as_str()).map(String::from))
                    .unwrap_or_default();
                tracing::warn!(error = %e, "unparseable request line");
                ipc::err(&id, "bad_json", e.to_string(), None)
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    Ok(())
}
