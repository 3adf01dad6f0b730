use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

/// Line-delimited JSON sidecar for school records.
///
/// Requests are read from stdin one per line; responses go to stdout.
/// Logs always go to stderr.
#[derive(Debug, Clone, Parser)]
#[command(name = "schoold")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Config {
    /// Workspace directory to open at startup (same as `workspace.select`)
    #[arg(long, env = "SCHOOLD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "SCHOOLD_LOG_LEVEL", default_value = "info")]
    pub log_level: Level,

    /// Emit logs as JSON lines
    #[arg(long, env = "SCHOOLD_LOG_JSON")]
    pub log_json: bool,
}
