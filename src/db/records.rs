//! Record types and the recognition resolution policy.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Recognition state of an image record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Recognized,
    Failed,
    Manual,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Recognized => "recognized",
            RecordStatus::Failed => "failed",
            RecordStatus::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RecordStatus::Pending),
            "recognized" => Some(RecordStatus::Recognized),
            "failed" => Some(RecordStatus::Failed),
            "manual" => Some(RecordStatus::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for RecordStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RecordStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        RecordStatus::from_str(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown status {s:?}").into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: i64,
    pub content_fingerprint: String,
    pub perceptual_fingerprint: String,
    pub md5: String,
    pub asset_path: PathBuf,
    pub external_ref: Option<String>,
    pub text: Option<String>,
    pub status: RecordStatus,
    pub failure_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
    pub reingested: bool,
}

impl ImageRecord {
    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Fields supplied when a record is created. Status follows from `text`:
/// `manual` when non-blank, otherwise `pending`.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub content_fingerprint: String,
    pub perceptual_fingerprint: String,
    pub md5: String,
    pub asset_path: PathBuf,
    pub external_ref: Option<String>,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A failed record, as shown to the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureEntry {
    pub id: i64,
    pub failure_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub external_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub recognized: usize,
    pub failed: usize,
    pub manual: usize,
    pub archived: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.recognized + self.failed + self.manual
    }
}

/// What a recognition attempt did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Usable text stored, status `recognized`.
    Recognized,
    /// Nothing recognized but earlier text kept untouched.
    Preserved,
    /// Nothing recognized; stays pending with the new failure count.
    Retried { failure_count: u32 },
    /// Nothing recognized and the retry ceiling was reached.
    Failed { failure_count: u32 },
    /// The record left `pending` while the batch ran.
    Skipped,
}

/// Decide the outcome of one attempt. `recognized` is the filtered text,
/// `None` when nothing usable came back.
pub fn resolve(
    status: RecordStatus,
    existing_text: Option<&str>,
    failure_count: u32,
    recognized: Option<&str>,
    max_retries: u32,
) -> Resolution {
    if status != RecordStatus::Pending {
        return Resolution::Skipped;
    }

    if recognized.is_some_and(|t| !t.trim().is_empty()) {
        return Resolution::Recognized;
    }

    if existing_text.is_some_and(|t| !t.trim().is_empty()) {
        return Resolution::Preserved;
    }

    // A ceiling of zero fails the record without counting past it.
    let failure_count = failure_count.saturating_add(1).min(max_retries);
    if failure_count >= max_retries {
        Resolution::Failed { failure_count }
    } else {
        Resolution::Retried { failure_count }
    }
}
