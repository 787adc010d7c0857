//! picseek daemon: fires recognition and archiving on a schedule.
//!
//! - Once a day at `recognition.scheduled_time`, works through the pending
//!   recognition queue in batches.
//! - Every `schedule.archive_interval_minutes`, checks whether the active
//!   image directory is over its threshold and archives the oldest images.
//!
//! Jobs run on the blocking thread pool. A job that fires while the previous
//! run of the same kind is still going is coalesced, not queued.
//!
//! ## Usage
//!
//! ```bash
//! picseek-daemon              # Run in foreground
//! picseek-daemon --once       # Drain recognition and check the archive once, then exit
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use picseek::coordinator::{Coordinator, RunOutcome};
use picseek::recognition::HttpOcrEngine;
use picseek::schedule::{Job, ScheduleManager};
use picseek::{logging, Config, ImageIndex};

/// Daemon configuration
struct DaemonConfig {
    /// Run once and exit
    once: bool,
    /// Config path override
    config_path: Option<PathBuf>,
    /// Poll interval override (seconds)
    poll_interval: Option<u64>,
}

fn parse_args() -> DaemonConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = DaemonConfig {
        once: false,
        config_path: None,
        poll_interval: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" | "-1" => {
                config.once = true;
            }
            "--interval" | "-i" => {
                match parse_interval(args.get(i + 1).map(String::as_str)) {
                    Ok(interval) => config.poll_interval = Some(interval),
                    Err(e) => {
                        eprintln!("Error: {e:#}");
                        std::process::exit(1);
                    }
                }
                i += 1;
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

/// Whole seconds, at least one.
fn parse_interval(value: Option<&str>) -> Result<u64> {
    let value = value.context("--interval needs a number of seconds")?;
    let secs: u64 = value
        .parse()
        .with_context(|| format!("invalid --interval value: {value}"))?;
    if secs == 0 {
        anyhow::bail!("--interval must be at least 1 second");
    }
    Ok(secs)
}

fn print_help() {
    println!(
        r#"picseek-daemon - scheduled recognition and archiving for picseek

USAGE:
    picseek-daemon [OPTIONS]

OPTIONS:
    --once, -1          Drain recognition and run the archive check once, then exit
    --interval, -i N    Poll interval in seconds (default: schedule.poll_interval_secs)
    --config, -c PATH   Path to config file
    --help, -h          Show this help message

ENVIRONMENT:
    PICSEEK_CONFIG      Path to config file (overrides default location)
    PICSEEK_LOG         Log level (trace, debug, info, warn, error)
"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let daemon_config = parse_args();

    logging::init(logging::Fallback::Stderr)?;

    info!("picseek daemon starting...");

    let config = match &daemon_config.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Config loaded");

    let index = ImageIndex::open(&config).context("Failed to open image index")?;
    info!(db = %config.db_path.display(), cached = index.cache().len(), "Index opened");

    let engine = Arc::new(HttpOcrEngine::new(&config.recognition));
    let coordinator = Arc::new(Coordinator::new(
        Arc::new(index),
        engine,
        config.recognition.clone(),
    ));

    if daemon_config.once {
        info!("Running in single-shot mode");
        run_job(coordinator.clone(), Job::RecognitionDrain).await;
        run_job(coordinator, Job::ArchiveCheck).await;
    } else {
        let poll_interval = daemon_config
            .poll_interval
            .unwrap_or(config.schedule.poll_interval_secs)
            .max(1);
        let schedule = ScheduleManager::from_config(&config)?;
        info!("Running in daemon mode, polling every {} seconds", poll_interval);
        run_daemon_loop(coordinator, schedule, poll_interval).await;
    }

    info!("picseek daemon stopped");
    Ok(())
}

async fn run_daemon_loop(
    coordinator: Arc<Coordinator>,
    mut schedule: ScheduleManager,
    poll_interval: u64,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(poll_interval));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for job in schedule.due(Local::now().naive_local(), Instant::now()) {
                    // Detached: a long drain must not hold up the archive check.
                    tokio::spawn(run_job(coordinator.clone(), job));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }
}

async fn run_job(coordinator: Arc<Coordinator>, job: Job) {
    let result = tokio::task::spawn_blocking(move || match job {
        Job::RecognitionDrain => coordinator.drain_recognition().map(|outcome| match outcome {
            RunOutcome::Completed(report) => info!(
                batches = report.batches,
                recognized = report.totals.recognized,
                retried = report.totals.retried,
                failed = report.totals.failed,
                truncated = report.truncated,
                "Scheduled recognition finished"
            ),
            RunOutcome::Coalesced => warn!("Recognition still running from the last trigger"),
        }),
        Job::ArchiveCheck => coordinator.run_archive_check().map(|outcome| match outcome {
            RunOutcome::Completed(report) => info!(
                active = report.active_after,
                moved = report.moved,
                "Archive check finished"
            ),
            RunOutcome::Coalesced => warn!("Archive check still running from the last trigger"),
        }),
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(?job, error = %e, "Scheduled job failed"),
        Err(e) => error!(?job, error = %e, "Scheduled job panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval(Some("30")).unwrap(), 30);
        assert!(parse_interval(Some("30s")).is_err());
        assert!(parse_interval(Some("-5")).is_err());
        assert!(parse_interval(Some("0")).is_err());
        assert!(parse_interval(None).is_err());
    }
}
