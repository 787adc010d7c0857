//! Record store operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::path::{Path, PathBuf};

use super::records::{
    resolve, FailureEntry, ImageRecord, NewRecord, RecordStatus, Resolution, StatusCounts,
};
use super::Database;
use crate::error::{Error, Result};

const RECORD_COLUMNS: &str = "id, content_fingerprint, perceptual_fingerprint, md5, \
     asset_path, external_ref, text, status, failure_count, last_attempt_at, created_at, \
     archived_at, reingested";

/// Never-attempted records first, then the least recently attempted, so a
/// record that keeps coming back empty cannot hold the head of the queue.
const PENDING_ORDER: &str =
    "last_attempt_at IS NOT NULL, last_attempt_at ASC, created_at ASC, id ASC";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: row.get(0)?,
        content_fingerprint: row.get(1)?,
        perceptual_fingerprint: row.get(2)?,
        md5: row.get(3)?,
        asset_path: PathBuf::from(row.get::<_, String>(4)?),
        external_ref: row.get(5)?,
        text: row.get(6)?,
        status: row.get(7)?,
        failure_count: row.get(8)?,
        last_attempt_at: row.get(9)?,
        created_at: row.get(10)?,
        archived_at: row.get(11)?,
        reingested: row.get(12)?,
    })
}

fn sql_limit(limit: Option<usize>) -> i64 {
    // SQLite treats a negative LIMIT as "no limit".
    limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1)
}

impl Database {
    // ========================================================================
    // Creation and lookup
    // ========================================================================

    /// Insert a new record. Unless `force` is set, an existing record with the
    /// same content fingerprint makes this fail with `DuplicateFingerprint`.
    /// Forced inserts over an existing fingerprint are flagged `reingested`.
    pub fn create(&self, new: &NewRecord, force: bool) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM images WHERE content_fingerprint = ? ORDER BY id LIMIT 1",
                [&new.content_fingerprint],
                |row| row.get(0),
            )
            .optional()?;

        if let (Some(existing_id), false) = (existing, force) {
            return Err(Error::DuplicateFingerprint { existing_id });
        }

        let text = new.text.as_deref().filter(|t| !t.trim().is_empty());
        let status = if text.is_some() {
            RecordStatus::Manual
        } else {
            RecordStatus::Pending
        };

        tx.execute(
            r#"
            INSERT INTO images (
                content_fingerprint, perceptual_fingerprint, md5, asset_path,
                external_ref, text, status, failure_count, created_at, reingested
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)
            "#,
            params![
                new.content_fingerprint,
                new.perceptual_fingerprint,
                new.md5,
                new.asset_path.to_string_lossy(),
                new.external_ref,
                text,
                status,
                new.created_at,
                existing.is_some(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(id)
    }

    pub fn get(&self, id: i64) -> Result<ImageRecord> {
        let conn = self.conn();
        let sql = format!("SELECT {RECORD_COLUMNS} FROM images WHERE id = ?");
        conn.query_row(&sql, [id], row_to_record)
            .optional()?
            .ok_or(Error::RecordNotFound(id))
    }

    /// Fetch several records, keeping the order of `ids`. Unknown ids are skipped.
    pub fn get_many(&self, ids: &[i64]) -> Result<Vec<ImageRecord>> {
        let conn = self.conn();
        let sql = format!("SELECT {RECORD_COLUMNS} FROM images WHERE id = ?");
        let mut stmt = conn.prepare_cached(&sql)?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = stmt.query_row([id], row_to_record).optional()? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Id of the oldest record with this content fingerprint.
    pub fn find_by_content(&self, content_fingerprint: &str) -> Result<Option<i64>> {
        let conn = self.conn();
        let id = conn
            .query_row(
                "SELECT id FROM images WHERE content_fingerprint = ? ORDER BY id LIMIT 1",
                [content_fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    // ========================================================================
    // Updates
    // ========================================================================

    /// Replace text, status and failure count in one statement. A `None`
    /// `last_attempt_at` leaves the stored attempt time as it is.
    pub fn update_text(
        &self,
        id: i64,
        text: Option<&str>,
        status: RecordStatus,
        failure_count: u32,
        last_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn();
        let changed = conn.execute(
            r#"
            UPDATE images
            SET text = ?1, status = ?2, failure_count = ?3,
                last_attempt_at = COALESCE(?4, last_attempt_at)
            WHERE id = ?5
            "#,
            params![text, status, failure_count, last_attempt_at, id],
        )?;

        if changed == 0 {
            return Err(Error::RecordNotFound(id));
        }
        Ok(())
    }

    /// Set the external reference. Write-once: a second call fails and the
    /// stored value stays as it was.
    pub fn set_external_ref(&self, id: i64, reference: &str) -> Result<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE images SET external_ref = ? WHERE id = ? AND external_ref IS NULL",
            params![reference, id],
        )?;
        if changed == 1 {
            return Ok(());
        }

        let existing: Option<Option<String>> = conn
            .query_row("SELECT external_ref FROM images WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .optional()?;

        match existing {
            None => Err(Error::RecordNotFound(id)),
            Some(existing) => Err(Error::ReferenceAlreadySet {
                id,
                existing: existing.unwrap_or_default(),
            }),
        }
    }

    /// Put a record back in the automatic queue with a clean failure count.
    /// Existing text is kept.
    pub fn requeue(&self, id: i64) -> Result<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE images SET status = ?, failure_count = 0 WHERE id = ?",
            params![RecordStatus::Pending, id],
        )?;
        if changed == 0 {
            return Err(Error::RecordNotFound(id));
        }
        Ok(())
    }

    /// Apply the outcome of one recognition attempt. The read and the write
    /// happen in one transaction, so a record the operator touched in the
    /// meantime is left alone.
    pub fn resolve_recognition(
        &self,
        id: i64,
        recognized: Option<&str>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let (status, text, failure_count): (RecordStatus, Option<String>, u32) = tx
            .query_row(
                "SELECT status, text, failure_count FROM images WHERE id = ?",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or(Error::RecordNotFound(id))?;

        let resolution = resolve(status, text.as_deref(), failure_count, recognized, max_retries);

        match resolution {
            Resolution::Recognized => {
                tx.execute(
                    r#"
                    UPDATE images
                    SET text = ?1, status = ?2, failure_count = 0, last_attempt_at = ?3
                    WHERE id = ?4
                    "#,
                    params![recognized, RecordStatus::Recognized, now, id],
                )?;
            }
            Resolution::Preserved => {
                tx.execute(
                    "UPDATE images SET last_attempt_at = ? WHERE id = ?",
                    params![now, id],
                )?;
            }
            Resolution::Retried { failure_count } => {
                tx.execute(
                    "UPDATE images SET failure_count = ?, last_attempt_at = ? WHERE id = ?",
                    params![failure_count, now, id],
                )?;
            }
            Resolution::Failed { failure_count } => {
                tx.execute(
                    r#"
                    UPDATE images
                    SET status = ?1, failure_count = ?2, last_attempt_at = ?3
                    WHERE id = ?4
                    "#,
                    params![RecordStatus::Failed, failure_count, now, id],
                )?;
            }
            Resolution::Skipped => {}
        }

        tx.commit()?;
        Ok(resolution)
    }

    pub fn mark_archived(&self, id: i64, new_path: &Path, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE images SET asset_path = ?, archived_at = ? WHERE id = ?",
            params![new_path.to_string_lossy(), at, id],
        )?;
        if changed == 0 {
            return Err(Error::RecordNotFound(id));
        }
        Ok(())
    }

    // ========================================================================
    // Listings
    // ========================================================================

    /// Pending records in `PENDING_ORDER`: untried ones oldest first.
    pub fn list_pending(&self, limit: usize) -> Result<Vec<ImageRecord>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM images WHERE status = ? \
             ORDER BY {PENDING_ORDER} LIMIT ?"
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![RecordStatus::Pending, sql_limit(Some(limit))], row_to_record)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }

    /// Pending records with no attempt at or after `since`, in `PENDING_ORDER`.
    pub fn list_pending_not_attempted_since(
        &self,
        limit: usize,
        since: DateTime<Utc>,
    ) -> Result<Vec<ImageRecord>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM images \
             WHERE status = ? AND (last_attempt_at IS NULL OR last_attempt_at < ?) \
             ORDER BY {PENDING_ORDER} LIMIT ?"
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(
                params![RecordStatus::Pending, since, sql_limit(Some(limit))],
                row_to_record,
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }

    /// Failed records, most recent attempt first. `None` lists them all.
    pub fn list_failed(&self, limit: Option<usize>) -> Result<Vec<FailureEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, failure_count, last_attempt_at, external_ref
            FROM images
            WHERE status = ?
            ORDER BY last_attempt_at DESC, id DESC
            LIMIT ?
            "#,
        )?;
        let entries = stmt
            .query_map(params![RecordStatus::Failed, sql_limit(limit)], |row| {
                Ok(FailureEntry {
                    id: row.get(0)?,
                    failure_count: row.get(1)?,
                    last_attempt_at: row.get(2)?,
                    external_ref: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    pub fn count_by_status(&self) -> Result<StatusCounts> {
        let conn = self.conn();
        let mut counts = StatusCounts::default();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM images GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, RecordStatus>(0)?, row.get::<_, i64>(1)?)))?
            .filter_map(|r| r.ok());
        for (status, count) in rows {
            let count = count as usize;
            match status {
                RecordStatus::Pending => counts.pending = count,
                RecordStatus::Recognized => counts.recognized = count,
                RecordStatus::Failed => counts.failed = count,
                RecordStatus::Manual => counts.manual = count,
            }
        }

        counts.archived = conn.query_row(
            "SELECT COUNT(*) FROM images WHERE archived_at IS NOT NULL",
            [],
            |row| row.get::<_, i64>(0),
        )? as usize;

        Ok(counts)
    }

    /// Every non-empty text with its record id and creation time.
    pub fn list_texts(&self) -> Result<Vec<(i64, String, DateTime<Utc>)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, text, created_at FROM images WHERE text IS NOT NULL AND text != ''",
        )?;
        let texts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(texts)
    }

    /// Perceptual fingerprints of every record.
    pub fn list_perceptual(&self) -> Result<Vec<(i64, String, DateTime<Utc>)>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, perceptual_fingerprint, created_at FROM images")?;
        let hashes = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(hashes)
    }

    /// Processed records still in the active set, oldest first.
    pub fn list_archivable(&self, limit: usize) -> Result<Vec<ImageRecord>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM images \
             WHERE status IN ('recognized', 'failed', 'manual') AND archived_at IS NULL \
             ORDER BY created_at ASC, id ASC LIMIT ?"
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([sql_limit(Some(limit))], row_to_record)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }
}
