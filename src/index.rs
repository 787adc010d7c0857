//! The image index: record store, text cache and asset directory behind one
//! handle.
//!
//! Every write that touches text goes through here so the cache never drifts
//! from the store. A single write lock covers the store write and the cache
//! update together; reads take no lock beyond the cache's own.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::config::{AssetConfig, Config, SearchConfig};
use crate::db::{
    Database, FailureEntry, ImageRecord, NewRecord, RecordStatus, Resolution, StatusCounts,
};
use crate::error::{Error, Result};
use crate::fingerprint::{self, Fingerprints};
use crate::search::{self, SearchHit, SearchMode};
use crate::text::TextCache;

/// Options for [`ImageIndex::ingest`].
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Originating message reference, stored write-once.
    pub external_ref: Option<String>,
    /// Text supplied by the operator. The record starts out `manual`.
    pub text: Option<String>,
    /// Index the bytes even when they are already indexed.
    pub force: bool,
    /// Return images similar to the new one along with it.
    pub search_after: bool,
}

#[derive(Debug, Clone)]
pub struct Ingested {
    pub id: i64,
    pub asset_path: PathBuf,
    pub fingerprints: Fingerprints,
    /// Filled only when `search_after` was requested.
    pub similar: Vec<SearchHit>,
}

pub struct ImageIndex {
    db: Database,
    cache: TextCache,
    write_lock: Mutex<()>,
    assets: AssetConfig,
    search: SearchConfig,
}

impl ImageIndex {
    /// Open the configured database and rebuild the text cache from it.
    pub fn open(config: &Config) -> Result<Self> {
        let db = Database::open(&config.db_path)?;
        db.initialize()?;
        Self::new(db, config.assets.clone(), config.search.clone())
    }

    pub fn new(db: Database, assets: AssetConfig, search: SearchConfig) -> Result<Self> {
        fs::create_dir_all(&assets.path)?;

        let cache = TextCache::new();
        cache.rebuild(&db)?;

        Ok(Self {
            db,
            cache,
            write_lock: Mutex::new(()),
            assets,
            search,
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn cache(&self) -> &TextCache {
        &self.cache
    }

    pub fn assets(&self) -> &AssetConfig {
        &self.assets
    }

    pub fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Fingerprint the bytes, store them in the active directory and create a
    /// record. Already-indexed bytes fail with `DuplicateFingerprint` and
    /// leave nothing behind, unless `force` is set.
    pub fn ingest(&self, bytes: &[u8], options: &IngestOptions) -> Result<Ingested> {
        let fingerprints = fingerprint::compute_fingerprints(bytes)?;

        let text = options
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        // Held from the duplicate check until the record exists, so identical
        // concurrent ingestions never both write a file.
        let guard = self.write_guard();

        if !options.force {
            if let Some(existing_id) = fingerprint::is_duplicate(&self.db, &fingerprints.content)? {
                debug!(existing_id, "Duplicate image, not indexed");
                return Err(Error::DuplicateFingerprint { existing_id });
            }
        }

        let created_at = Utc::now();
        let asset_path = self.write_asset(bytes, &fingerprints, created_at)?;

        let new = NewRecord {
            content_fingerprint: fingerprints.content.clone(),
            perceptual_fingerprint: fingerprints.perceptual.clone(),
            md5: fingerprints.md5.clone(),
            asset_path: asset_path.clone(),
            external_ref: options.external_ref.clone(),
            text: text.clone(),
            created_at,
        };

        let id = match self.db.create(&new, options.force) {
            Ok(id) => id,
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&asset_path) {
                    warn!(
                        path = %asset_path.display(),
                        error = %remove_err,
                        "Failed to remove orphaned asset"
                    );
                }
                return Err(e);
            }
        };
        if let Some(text) = &text {
            self.cache.put(id, text, created_at);
        }
        drop(guard);

        info!(id, path = %asset_path.display(), forced = options.force, "Image indexed");

        let similar = if options.search_after {
            search::search_fingerprints(self, &fingerprints, Some(id), self.search.default_limit)?
        } else {
            Vec::new()
        };

        Ok(Ingested {
            id,
            asset_path,
            fingerprints,
            similar,
        })
    }

    /// `<millis>_<sha prefix>.<ext>` in the active directory, with `_N` added
    /// when a forced re-ingestion lands on an existing name.
    fn write_asset(
        &self,
        bytes: &[u8],
        fingerprints: &Fingerprints,
        created_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.assets.path)?;

        let ext = image::guess_format(bytes)
            .ok()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("img");
        let stem = format!(
            "{}_{}",
            created_at.timestamp_millis(),
            &fingerprints.content[..12.min(fingerprints.content.len())]
        );

        let path = unique_path(&self.assets.path, &stem, ext);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    // ========================================================================
    // Operator operations
    // ========================================================================

    pub fn get(&self, id: i64) -> Result<ImageRecord> {
        self.db.get(id)
    }

    /// Set the text by hand. The record becomes `manual` and leaves the
    /// automatic pipeline. Blank text is the same as [`untag`](Self::untag).
    pub fn tag(&self, id: i64, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return self.untag(id);
        }

        let _guard = self.write_guard();
        let record = self.db.get(id)?;
        self.db.update_text(id, Some(text), RecordStatus::Manual, 0, None)?;
        self.cache.put(id, text, record.created_at);

        info!(id, "Record tagged");
        Ok(())
    }

    /// Clear the text and hand the record back to the pipeline.
    pub fn untag(&self, id: i64) -> Result<()> {
        let _guard = self.write_guard();
        self.db.update_text(id, None, RecordStatus::Pending, 0, None)?;
        self.cache.remove(id);

        info!(id, "Record untagged");
        Ok(())
    }

    pub fn set_external_ref(&self, id: i64, reference: &str) -> Result<()> {
        self.db.set_external_ref(id, reference)
    }

    /// Reset a record to `pending` with a clean failure count.
    pub fn requeue(&self, id: i64) -> Result<()> {
        self.db.requeue(id)?;
        info!(id, "Record requeued");
        Ok(())
    }

    pub fn failures(&self, limit: Option<usize>) -> Result<Vec<FailureEntry>> {
        self.db.list_failed(limit)
    }

    pub fn stats(&self) -> Result<StatusCounts> {
        self.db.count_by_status()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn search_text(
        &self,
        mode: SearchMode,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        search::search_text(self, mode, query, limit)
    }

    pub fn search_image(&self, bytes: &[u8], limit: Option<usize>) -> Result<Vec<SearchHit>> {
        search::search_image(self, bytes, limit)
    }

    // ========================================================================
    // Pipeline hook
    // ========================================================================

    /// Store the outcome of one recognition attempt and mirror it into the cache.
    pub(crate) fn apply_recognition(
        &self,
        record: &ImageRecord,
        recognized: Option<&str>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        let _guard = self.write_guard();
        let resolution = self.db.resolve_recognition(record.id, recognized, max_retries, now)?;

        if let (Resolution::Recognized, Some(text)) = (resolution, recognized) {
            self.cache.put(record.id, text, record.created_at);
        }
        Ok(resolution)
    }
}

/// `dir/stem.ext`, or `dir/stem_N.ext` for the first free N.
pub(crate) fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let path = dir.join(format!("{stem}.{ext}"));
    if !path.exists() {
        return path;
    }

    let mut n = 1;
    loop {
        let candidate = dir.join(format!("{stem}_{n}.{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
