//! Batch recognition over pending records.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::{RecognitionEngine, RecognitionLease};
use crate::config::RecognitionConfig;
use crate::db::{ImageRecord, Resolution};
use crate::error::Result;
use crate::index::ImageIndex;
use crate::text::{apply_filters, TextFilter};

/// Counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub selected: usize,
    pub recognized: usize,
    /// Empty result, earlier text kept.
    pub preserved: usize,
    /// Empty result, still pending.
    pub retried: usize,
    /// Empty result, retry ceiling reached.
    pub failed: usize,
    /// Changed by the operator mid-batch.
    pub skipped: usize,
}

impl BatchReport {
    fn record(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Recognized => self.recognized += 1,
            Resolution::Preserved => self.preserved += 1,
            Resolution::Retried { .. } => self.retried += 1,
            Resolution::Failed { .. } => self.failed += 1,
            Resolution::Skipped => self.skipped += 1,
        }
    }

    fn merge(&mut self, other: &BatchReport) {
        self.selected += other.selected;
        self.recognized += other.recognized;
        self.preserved += other.preserved;
        self.retried += other.retried;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub batches: usize,
    pub totals: BatchReport,
    /// Stopped at the iteration cap with work possibly left.
    pub truncated: bool,
}

/// Recognize up to `batch_size` pending records: never-attempted ones oldest
/// first, then those whose last attempt is furthest back.
///
/// With nothing pending the engine is not acquired at all. Otherwise one
/// lease covers the whole batch and is released however the batch ends.
pub fn run_batch(
    index: &ImageIndex,
    engine: &dyn RecognitionEngine,
    config: &RecognitionConfig,
) -> Result<BatchReport> {
    let records = index.db().list_pending(config.batch_size)?;
    process_records(index, engine, config, &records)
}

/// Run batches until every record that was pending at the start has had an
/// attempt in this run, or `max_iterations` batches have run.
pub fn drain(
    index: &ImageIndex,
    engine: &dyn RecognitionEngine,
    config: &RecognitionConfig,
) -> Result<DrainReport> {
    let started = Utc::now();
    let mut report = DrainReport::default();

    loop {
        let records = index
            .db()
            .list_pending_not_attempted_since(config.batch_size, started)?;
        if records.is_empty() {
            break;
        }
        if report.batches >= config.max_iterations {
            warn!(
                max_iterations = config.max_iterations,
                "Recognition drain hit its iteration cap"
            );
            report.truncated = true;
            break;
        }

        let batch = process_records(index, engine, config, &records)?;
        report.batches += 1;
        report.totals.merge(&batch);
    }

    info!(
        batches = report.batches,
        recognized = report.totals.recognized,
        failed = report.totals.failed,
        "Recognition drain finished"
    );
    Ok(report)
}

fn process_records(
    index: &ImageIndex,
    engine: &dyn RecognitionEngine,
    config: &RecognitionConfig,
    records: &[ImageRecord],
) -> Result<BatchReport> {
    let mut report = BatchReport {
        selected: records.len(),
        ..Default::default()
    };
    if records.is_empty() {
        return Ok(report);
    }

    let mut lease = RecognitionLease::acquire(engine)?;

    for record in records {
        let text = recognize_one(&mut lease, record, &config.filters);
        match index.apply_recognition(record, text.as_deref(), config.max_retries, Utc::now()) {
            Ok(resolution) => {
                debug!(id = record.id, ?resolution, "Recognition attempt resolved");
                report.record(resolution);
            }
            Err(e) => {
                // The record keeps its previous state and is picked up again later.
                error!(id = record.id, error = %e, "Failed to store recognition result");
                report.record(Resolution::Skipped);
            }
        }
    }

    info!(
        selected = report.selected,
        recognized = report.recognized,
        preserved = report.preserved,
        retried = report.retried,
        failed = report.failed,
        skipped = report.skipped,
        "Recognition batch finished"
    );
    Ok(report)
}

/// Filtered text for one record. Every per-image problem ends up as `None`.
fn recognize_one(
    lease: &mut RecognitionLease<'_>,
    record: &ImageRecord,
    filters: &[TextFilter],
) -> Option<String> {
    let path = &record.asset_path;

    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {}
        Ok(_) => {
            warn!(id = record.id, path = %path.display(), "Asset file is empty");
            return None;
        }
        Err(e) => {
            warn!(id = record.id, path = %path.display(), error = %e, "Asset file unreadable");
            return None;
        }
    }

    match lease.recognize(path) {
        Ok(raw) => apply_filters(&raw, filters),
        Err(e) => {
            warn!(id = record.id, error = %e, "Recognition failed");
            None
        }
    }
}
