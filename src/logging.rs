//! Logging configuration with journald support on Linux.
//!
//! On Linux the journal is used when reachable. Otherwise the CLI logs to a
//! daily file under the data directory and the daemon logs to stderr.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where log lines go when journald is not available.
#[derive(Debug, Clone)]
pub enum Fallback {
    /// Daily-rolling file in the given directory, or the default log directory.
    File(Option<PathBuf>),
    Stderr,
}

/// Initialize the logging system.
///
/// Log level can be controlled via the `PICSEEK_LOG` environment variable:
/// - `PICSEEK_LOG=debug` for verbose output
/// - `PICSEEK_LOG=info` for standard output (default)
/// - `PICSEEK_LOG=picseek::recognition=debug,warn` for per-module filters
pub fn init(fallback: Fallback) -> Result<()> {
    let env_filter = EnvFilter::try_from_env("PICSEEK_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer)
                .try_init()
                .context("Failed to set tracing subscriber")?;

            tracing::info!("Logging initialized with journald backend");
            return Ok(());
        }
    }

    match fallback {
        Fallback::Stderr => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to set tracing subscriber")?;
        }
        Fallback::File(log_dir) => {
            let log_dir = log_dir.unwrap_or_else(default_log_dir);
            std::fs::create_dir_all(&log_dir)?;

            let file_appender = tracing_appender::rolling::daily(&log_dir, "picseek.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // The writer stops flushing once its guard drops; keep it for the process lifetime.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .try_init()
                .context("Failed to set tracing subscriber")?;

            tracing::info!("Logging initialized with file backend at {:?}", log_dir);
        }
    }

    Ok(())
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("picseek")
        .join("logs")
}
