//! Tracing setup for a run.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, written to stderr
//!   and mirrored to `<log_dir>/<run_id>.log`.
//!
//! - **Transcripts (`io/transcript`)**: full prompts and responses per turn,
//!   written only with `--verbose`.

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Where and how loudly to log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    pub verbose: bool,
}

/// Identity and file locations of the current run's logs.
#[derive(Debug, Clone)]
pub struct LogHandle {
    pub run_id: String,
    pub log_path: PathBuf,
    /// Per-turn transcript root, `<log_dir>/<run_id>/`.
    pub transcript_dir: PathBuf,
}

/// Local timestamp run id, e.g. `20250101_093000`.
pub fn new_run_id() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Install the global subscriber: compact stderr plus a plain-text log file.
///
/// Reads `RUST_LOG`. Defaults to `info`, or `debug` when verbose.
///
/// # Example
/// ```bash
/// RUST_LOG=coder=debug coder -p "add a README"
/// ```
pub fn init(cfg: &LogConfig) -> Result<LogHandle> {
    fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("create log dir {}", cfg.log_dir.display()))?;
    let run_id = new_run_id();
    let log_path = cfg.log_dir.join(format!("{run_id}.log"));
    let file =
        File::create(&log_path).with_context(|| format!("create {}", log_path.display()))?;

    let default_level = if cfg.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .try_init()
        .context("install tracing subscriber")?;

    Ok(LogHandle {
        transcript_dir: cfg.log_dir.join(&run_id),
        run_id,
        log_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_a_compact_timestamp() {
        let id = new_run_id();
        assert_eq!(id.len(), 15);
        assert_eq!(id.as_bytes()[8], b'_');
        assert!(id.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
    }
}
