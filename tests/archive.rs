//! Archive checks over real asset directories.

mod common;

use common::{fixture, fixture_with, ingest};
use picseek::archive::ArchiveManager;
use picseek::SearchMode;

#[test]
fn one_over_threshold_moves_oldest_processed() {
    let fx = fixture();
    let threshold = fx.index.assets().archive_threshold;

    // The oldest image is still waiting for recognition and must stay put.
    let pending = ingest(&fx.index, 0, None);
    let processed: Vec<i64> = (1..=threshold as u32)
        .map(|seed| ingest(&fx.index, seed, Some(&format!("单据 {seed}号"))))
        .collect();

    let manager = ArchiveManager::new(fx.index.assets().clone());
    assert_eq!(manager.count_active().unwrap(), threshold + 1);

    let report = manager.run(fx.index.db()).unwrap();
    assert_eq!(report.active_before, threshold + 1);
    assert_eq!(report.moved, 1);
    assert_eq!(report.active_after, threshold);
    assert_eq!(manager.count_active().unwrap(), threshold);

    let folder = report.folder.unwrap();
    assert!(folder.starts_with(fx.index.assets().archive_dir()));

    let moved = fx.index.get(processed[0]).unwrap();
    assert!(moved.archived_at.is_some());
    assert!(moved.asset_path.starts_with(&folder));
    assert!(moved.asset_path.exists());

    let kept = fx.index.get(pending).unwrap();
    assert!(kept.archived_at.is_none());
    assert!(kept.asset_path.exists());

    // Still searchable, now pointing at the archived file.
    let hits = fx
        .index
        .search_text(SearchMode::Exact, "单据 1号", Some(fx.index.search_config().max_limit))
        .unwrap();
    let hit = hits.iter().find(|h| h.id == processed[0]).unwrap();
    assert_eq!(hit.asset_path, moved.asset_path);

    assert_eq!(fx.index.stats().unwrap().archived, 1);

    let again = manager.run(fx.index.db()).unwrap();
    assert_eq!(again.moved, 0);
    assert!(again.folder.is_none());
}

#[test]
fn under_threshold_is_a_no_op() {
    let fx = fixture_with(|assets| assets.archive_threshold = 3);
    for seed in 1..=3 {
        ingest(&fx.index, seed, Some("收据"));
    }

    let manager = ArchiveManager::new(fx.index.assets().clone());
    let report = manager.run(fx.index.db()).unwrap();
    assert_eq!(report.moved, 0);
    assert_eq!(report.active_after, 3);
    assert!(!fx.index.assets().archive_dir().exists());
}

#[test]
fn moves_only_as_many_as_needed() {
    let fx = fixture_with(|assets| assets.archive_threshold = 2);
    let ids: Vec<i64> = (1..=5).map(|seed| ingest(&fx.index, seed, Some("收据"))).collect();

    let manager = ArchiveManager::new(fx.index.assets().clone());
    let report = manager.run(fx.index.db()).unwrap();
    assert_eq!(report.moved, 3);
    assert_eq!(report.active_after, 2);

    for id in &ids[..3] {
        assert!(fx.index.get(*id).unwrap().archived_at.is_some());
    }
    for id in &ids[3..] {
        assert!(fx.index.get(*id).unwrap().archived_at.is_none());
    }
}

#[test]
fn nothing_processed_means_nothing_moves() {
    let fx = fixture_with(|assets| assets.archive_threshold = 1);
    for seed in 1..=3 {
        ingest(&fx.index, seed, None);
    }

    let manager = ArchiveManager::new(fx.index.assets().clone());
    let report = manager.run(fx.index.db()).unwrap();
    assert_eq!(report.moved, 0);
    assert_eq!(report.active_after, 3);
}

#[test]
fn store_failure_puts_file_back_and_continues() {
    let fx = fixture_with(|assets| assets.archive_threshold = 1);
    let ids: Vec<i64> = (1..=3).map(|seed| ingest(&fx.index, seed, Some("收据"))).collect();
    let blocked_path = fx.index.get(ids[0]).unwrap().asset_path;
    fx.block_updates(ids[0]);

    let manager = ArchiveManager::new(fx.index.assets().clone());
    let report = manager.run(fx.index.db()).unwrap();
    assert_eq!(report.moved, 1);
    assert_eq!(report.active_after, 2);

    let blocked = fx.index.get(ids[0]).unwrap();
    assert_eq!(blocked.asset_path, blocked_path);
    assert!(blocked.asset_path.is_file());
    assert!(blocked.archived_at.is_none());

    let archived = fx.index.get(ids[1]).unwrap();
    assert!(archived.archived_at.is_some());
    assert!(archived.asset_path.starts_with(report.folder.unwrap()));
    assert_eq!(manager.count_active().unwrap(), 2);
}
