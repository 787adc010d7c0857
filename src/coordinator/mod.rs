//! Single-flight entry points for the external trigger.
//!
//! A trigger (the daemon, an operator command) may fire while the previous
//! run of the same kind is still going. Such a call returns
//! [`RunOutcome::Coalesced`] right away; it is reported, not queued.
//!
//! The flight spans processes: each kind also holds an exclusive lock on
//! `.<kind>.lock` in the active image directory, so the CLI and the daemon
//! coalesce against each other too. The OS drops the lock with the process.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::archive::{ArchiveManager, ArchiveReport};
use crate::config::RecognitionConfig;
use crate::error::Result;
use crate::index::ImageIndex;
use crate::recognition::{self, BatchReport, DrainReport, RecognitionEngine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T> {
    Completed(T),
    /// A run of the same kind was already in progress.
    Coalesced,
}

impl<T> RunOutcome<T> {
    pub fn is_coalesced(&self) -> bool {
        matches!(self, RunOutcome::Coalesced)
    }
}

/// At most one holder at a time, across threads and processes.
struct SingleFlight {
    name: &'static str,
    lock_path: PathBuf,
    running: AtomicBool,
}

struct FlightGuard<'a> {
    running: &'a AtomicBool,
    lock: Option<File>,
}

impl SingleFlight {
    fn new(name: &'static str, lock_dir: &Path) -> Self {
        Self {
            name,
            lock_path: lock_dir.join(format!(".{name}.lock")),
            running: AtomicBool::new(false),
        }
    }

    /// `None` when another thread or process holds the flight.
    fn try_begin(&self) -> Result<Option<FlightGuard<'_>>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }
        let mut guard = FlightGuard {
            running: &self.running,
            lock: None,
        };

        if let Some(dir) = self.lock_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                guard.lock = Some(file);
                Ok(Some(guard))
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                debug!(
                    kind = self.name,
                    path = %self.lock_path.display(),
                    "Held by another process"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.lock.take() {
            let _ = file.unlock();
        }
        self.running.store(false, Ordering::Release);
    }
}

pub struct Coordinator {
    index: Arc<ImageIndex>,
    engine: Arc<dyn RecognitionEngine>,
    recognition: RecognitionConfig,
    archiver: ArchiveManager,
    recognition_flight: SingleFlight,
    archive_flight: SingleFlight,
}

impl Coordinator {
    pub fn new(
        index: Arc<ImageIndex>,
        engine: Arc<dyn RecognitionEngine>,
        recognition: RecognitionConfig,
    ) -> Self {
        let archiver = ArchiveManager::new(index.assets().clone());
        let lock_dir = index.assets().path.clone();
        Self {
            index,
            engine,
            recognition,
            archiver,
            recognition_flight: SingleFlight::new("recognition", &lock_dir),
            archive_flight: SingleFlight::new("archive", &lock_dir),
        }
    }

    pub fn index(&self) -> &ImageIndex {
        &self.index
    }

    pub fn recognition_running(&self) -> bool {
        self.recognition_flight.is_running()
    }

    pub fn archive_running(&self) -> bool {
        self.archive_flight.is_running()
    }

    /// One recognition batch.
    pub fn run_recognition_batch(&self) -> Result<RunOutcome<BatchReport>> {
        let Some(_flight) = self.recognition_flight.try_begin()? else {
            return Ok(self.coalesced(&self.recognition_flight));
        };
        let report = recognition::run_batch(&self.index, self.engine.as_ref(), &self.recognition)?;
        Ok(RunOutcome::Completed(report))
    }

    /// Batches until the pending queue has been worked through once. Shares
    /// the flight with [`run_recognition_batch`](Self::run_recognition_batch).
    pub fn drain_recognition(&self) -> Result<RunOutcome<DrainReport>> {
        let Some(_flight) = self.recognition_flight.try_begin()? else {
            return Ok(self.coalesced(&self.recognition_flight));
        };
        let report = recognition::drain(&self.index, self.engine.as_ref(), &self.recognition)?;
        Ok(RunOutcome::Completed(report))
    }

    pub fn run_archive_check(&self) -> Result<RunOutcome<ArchiveReport>> {
        let Some(_flight) = self.archive_flight.try_begin()? else {
            return Ok(self.coalesced(&self.archive_flight));
        };
        let report = self.archiver.run(self.index.db())?;
        Ok(RunOutcome::Completed(report))
    }

    fn coalesced<T>(&self, flight: &SingleFlight) -> RunOutcome<T> {
        info!(kind = flight.name, "Run already in progress, coalesced");
        RunOutcome::Coalesced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight() {
        let dir = tempfile::tempdir().unwrap();
        let flight = SingleFlight::new("test", dir.path());
        let guard = flight.try_begin().unwrap();
        assert!(guard.is_some());
        assert!(flight.is_running());
        assert!(flight.try_begin().unwrap().is_none());

        drop(guard);
        assert!(!flight.is_running());
        assert!(flight.try_begin().unwrap().is_some());
    }

    #[test]
    fn test_lock_file_excludes_other_flight_on_same_dir() {
        let dir = tempfile::tempdir().unwrap();
        let here = SingleFlight::new("test", dir.path());
        let elsewhere = SingleFlight::new("test", dir.path());

        let guard = here.try_begin().unwrap();
        assert!(guard.is_some());
        assert!(elsewhere.try_begin().unwrap().is_none());
        assert!(!elsewhere.is_running());

        // Other kinds use their own lock file.
        let other_kind = SingleFlight::new("other", dir.path());
        assert!(other_kind.try_begin().unwrap().is_some());

        drop(guard);
        assert!(elsewhere.try_begin().unwrap().is_some());
    }
}
