//! Tracing setup for the binary.
//!
//! Logs go to a daily-rotated file in the user data directory so they never
//! interleave with command output on stdout. `RUST_LOG` overrides the default
//! filter.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "dashsync=info";

/// Directory the log files are written to.
pub fn log_dir() -> Option<PathBuf> {
  dirs::data_local_dir().map(|dir| dir.join("dashsync").join("logs"))
}

/// Install the global subscriber. Keep the returned guard alive until exit,
/// or buffered lines are lost.
pub fn init(verbose: bool) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    EnvFilter::new(if verbose {
      "dashsync=debug"
    } else {
      DEFAULT_FILTER
    })
  });

  let Some(dir) = log_dir() else {
    // No data directory: log to stderr instead
    tracing_subscriber::registry()
      .with(filter)
      .with(fmt::layer().with_writer(std::io::stderr))
      .try_init()
      .map_err(|e| eyre!("Failed to install logger: {}", e))?;
    return Ok(None);
  };

  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "dashsync.log"));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| eyre!("Failed to install logger: {}", e))?;
  Ok(Some(guard))
}
