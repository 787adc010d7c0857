//! Keeps the active asset directory bounded.
//!
//! When the directory holds more images than the threshold, the oldest
//! processed images move to a dated folder under the archive directory. Their
//! records stay, pointing at the new location, so they remain searchable.

use anyhow::Context;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::AssetConfig;
use crate::db::{Database, ImageRecord};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub active_before: usize,
    pub active_after: usize,
    pub moved: usize,
    /// Folder the images went to, when anything moved.
    pub folder: Option<PathBuf>,
}

pub struct ArchiveManager {
    config: AssetConfig,
}

impl ArchiveManager {
    pub fn new(config: AssetConfig) -> Self {
        Self { config }
    }

    /// Image files directly inside the active directory.
    pub fn count_active(&self) -> Result<usize> {
        if !self.config.path.exists() {
            return Ok(0);
        }

        let count = WalkDir::new(&self.config.path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| self.is_image(e.path()))
            .count();
        Ok(count)
    }

    fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.config.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    fn in_active_dir(&self, path: &Path) -> bool {
        path.parent() == Some(self.config.path.as_path()) && path.is_file()
    }

    /// Move the oldest processed images out until the active count is back
    /// at or under the threshold.
    pub fn run(&self, db: &Database) -> Result<ArchiveReport> {
        let active_before = self.count_active()?;
        let threshold = self.config.archive_threshold;

        let mut report = ArchiveReport {
            active_before,
            active_after: active_before,
            ..Default::default()
        };

        if active_before <= threshold {
            debug!(active = active_before, threshold, "Archive not needed");
            return Ok(report);
        }
        let excess = active_before - threshold;

        let batch: Vec<ImageRecord> = db
            .list_archivable(usize::MAX)?
            .into_iter()
            .filter(|record| self.in_active_dir(&record.asset_path))
            .take(excess)
            .collect();

        let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
            warn!(
                active = active_before,
                threshold,
                "Over threshold but nothing is ready to archive"
            );
            return Ok(report);
        };

        let folder = self.create_archive_folder(first.created_at, last.created_at)?;
        let now = Utc::now();

        for record in &batch {
            let Some(file_name) = record.asset_path.file_name() else {
                continue;
            };
            let target = folder.join(file_name);

            if let Err(e) = move_file(&record.asset_path, &target) {
                warn!(id = record.id, error = %e, "Failed to archive image");
                continue;
            }

            match db.mark_archived(record.id, &target, now) {
                Ok(()) => report.moved += 1,
                Err(e) => {
                    // The record still names the active path, so the file goes back there.
                    warn!(id = record.id, error = %e, "Failed to record archived image");
                    if let Err(e) = move_file(&target, &record.asset_path) {
                        error!(
                            id = record.id,
                            from = %target.display(),
                            to = %record.asset_path.display(),
                            error = %e,
                            "Failed to restore image after archive error"
                        );
                    }
                }
            }
        }

        report.active_after = active_before - report.moved;
        info!(
            moved = report.moved,
            folder = %folder.display(),
            active = report.active_after,
            "Archived images"
        );
        report.folder = Some(folder);
        Ok(report)
    }

    /// `<archive_dir>/<YYYY.MM.DD>_<YYYY.MM.DD>`, suffixed `_N` when taken.
    fn create_archive_folder(&self, first: DateTime<Utc>, last: DateTime<Utc>) -> Result<PathBuf> {
        let archive_dir = self.config.archive_dir();
        fs::create_dir_all(&archive_dir)?;

        let base = folder_name(first, last);
        let mut folder = archive_dir.join(&base);
        let mut n = 1;
        while folder.exists() {
            folder = archive_dir.join(format!("{base}_{n}"));
            n += 1;
        }

        fs::create_dir_all(&folder)?;
        Ok(folder)
    }
}

pub fn folder_name(first: DateTime<Utc>, last: DateTime<Utc>) -> String {
    format!("{}_{}", first.format("%Y.%m.%d"), last.format("%Y.%m.%d"))
}

/// Rename, falling back to copy + delete across filesystems.
fn move_file(from: &Path, to: &Path) -> anyhow::Result<()> {
    if to.exists() {
        anyhow::bail!("{} already exists", to.display());
    }

    match fs::rename(from, to) {
        Ok(_) => Ok(()),
        Err(_) => {
            fs::copy(from, to).context("Failed to copy file to archive")?;
            fs::remove_file(from).context("Failed to remove original file after archiving")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_folder_name() {
        let first = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 4, 15, 23, 59, 0).unwrap();
        assert_eq!(folder_name(first, last), "2024.03.01_2024.04.15");
    }

    #[test]
    fn test_count_active_ignores_subdirs_and_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = AssetConfig {
            path: dir.path().to_path_buf(),
            ..Default::default()
        };
        fs::write(dir.path().join("a.png"), b"x").unwrap();
        fs::write(dir.path().join("b.JPG"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir_all(dir.path().join("archive/old")).unwrap();
        fs::write(dir.path().join("archive/old/c.png"), b"x").unwrap();

        let manager = ArchiveManager::new(config);
        assert_eq!(manager.count_active().unwrap(), 2);
    }

    #[test]
    fn test_folder_conflicts_get_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let config = AssetConfig {
            path: dir.path().join("active"),
            archive_dir: Some(dir.path().join("archive")),
            ..Default::default()
        };
        let manager = ArchiveManager::new(config);
        let day = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();

        let first = manager.create_archive_folder(day, day).unwrap();
        let second = manager.create_archive_folder(day, day).unwrap();
        assert!(first.ends_with("2024.03.01_2024.03.01"));
        assert!(second.ends_with("2024.03.01_2024.03.01_1"));
    }

    #[test]
    fn test_move_file_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.png");
        let to = dir.path().join("b.png");
        fs::write(&from, b"a").unwrap();
        fs::write(&to, b"b").unwrap();

        assert!(move_file(&from, &to).is_err());
        assert!(from.exists());

        fs::remove_file(&to).unwrap();
        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"a");
    }
}
