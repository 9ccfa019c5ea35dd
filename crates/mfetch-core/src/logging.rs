//! Logging init: file under the XDG state dir, or stderr as a fallback.
//!
//! Worker threads run inside a `download` span carrying the artifact id, so
//! every line a worker emits (attempts, retries, rotations, discarded temp
//! files) can be traced back to its artifact.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Default directives for a `-v` count. `RUST_LOG` overrides all of them.
pub fn default_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,mfetch_core=info,mfetch=info",
        1 => "info,mfetch_core=debug,mfetch=debug",
        _ => "debug,mfetch_core=trace,mfetch=trace",
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)))
}

/// `~/.local/state/mfetch/mfetch.log`.
pub fn log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mfetch")?;
    Ok(xdg_dirs.get_state_home().join("mfetch.log"))
}

/// Install the global subscriber writing to the log file and return its path.
/// Returns Err (e.g. log dir unwritable) so the caller can fall back to
/// `init_logging_stderr`.
pub fn init_logging(verbosity: u8) -> Result<PathBuf> {
    let path = log_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install log subscriber: {}", e))?;

    tracing::info!(verbosity, "mfetch logging initialized at {}", path.display());
    Ok(path)
}

/// Log to stderr only. A subscriber that is already installed wins.
pub fn init_logging_stderr(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbosity))
        .with_writer(io::stderr)
        .try_init();
}

/// Span entered by a download worker for its whole lifetime.
pub fn worker_span(artifact_id: &str) -> tracing::Span {
    tracing::info_span!("download", artifact = %artifact_id)
}
