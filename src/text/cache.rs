//! In-memory text cache: the single read path for text queries.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::fold::fold_with_variant;
use crate::db::Database;
use crate::error::Result;

#[derive(Debug, Clone)]
struct CacheEntry {
    normalized: String,
    variant: String,
    created_at: DateTime<Utc>,
}

/// One row of a cache snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedText {
    pub id: i64,
    pub normalized: String,
    pub variant: String,
    pub created_at: DateTime<Utc>,
}

/// Normalized text per record id. Derived from the record store and never
/// authoritative; callers keep it in step with every text-affecting write.
#[derive(Debug, Default)]
pub struct TextCache {
    entries: RwLock<HashMap<i64, CacheEntry>>,
}

impl TextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store normalized and variant forms for `id`. Blank text removes the entry.
    pub fn put(&self, id: i64, text: &str, created_at: DateTime<Utc>) {
        if text.trim().is_empty() {
            self.remove(id);
            return;
        }

        let (normalized, variant) = fold_with_variant(text);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            id,
            CacheEntry {
                normalized,
                variant,
                created_at,
            },
        );
    }

    pub fn remove(&self, id: i64) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&id);
    }

    pub fn snapshot(&self) -> Vec<CachedText> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .map(|(id, entry)| CachedText {
                id: *id,
                normalized: entry.normalized.clone(),
                variant: entry.variant.clone(),
                created_at: entry.created_at,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole cache with the texts currently in the store.
    pub fn rebuild(&self, db: &Database) -> Result<usize> {
        let texts = db.list_texts()?;

        let mut fresh = HashMap::with_capacity(texts.len());
        for (id, text, created_at) in texts {
            if text.trim().is_empty() {
                continue;
            }
            let (normalized, variant) = fold_with_variant(&text);
            fresh.insert(
                id,
                CacheEntry {
                    normalized,
                    variant,
                    created_at,
                },
            );
        }

        let count = fresh.len();
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        tracing::info!(entries = count, "Text cache rebuilt");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_stores_both_forms() {
        let cache = TextCache::new();
        let now = Utc::now();
        cache.put(1, "發票 ABC", now);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].normalized, "发票 abc");
        assert_eq!(snapshot[0].variant, "發票 abc");
        assert_eq!(snapshot[0].created_at, now);
    }

    #[test]
    fn test_blank_put_removes() {
        let cache = TextCache::new();
        cache.put(1, "receipt", Utc::now());
        cache.put(1, "  ", Utc::now());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_replaces_and_remove() {
        let cache = TextCache::new();
        cache.put(1, "old", Utc::now());
        cache.put(1, "new", Utc::now());
        cache.put(2, "other", Utc::now());
        assert_eq!(cache.len(), 2);

        let entry = cache.snapshot().into_iter().find(|e| e.id == 1).unwrap();
        assert_eq!(entry.normalized, "new");

        cache.remove(1);
        cache.remove(42);
        assert_eq!(cache.len(), 1);
    }
}
