//! Text and image queries over the index.
//!
//! Text queries only read the text cache; the record store is consulted
//! afterwards to decorate the final, truncated hit list. Image queries read
//! fingerprints from the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::SearchConfig;
use crate::db::{ImageRecord, RecordStatus};
use crate::error::{Error, Result};
use crate::fingerprint::{self, Fingerprints};
use crate::index::ImageIndex;
use crate::text::{fold, normalize_width_and_case, tokenize, CachedText};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Folded query as a substring of the folded text.
    Exact,
    /// Exact matches plus entries containing any segment of the query.
    Comprehensive,
    /// Raw query against either script form of the text.
    Contains,
    /// Perceptual similarity to a reference image.
    Similarity,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Exact => "exact",
            SearchMode::Comprehensive => "comprehensive",
            SearchMode::Contains => "contains",
            SearchMode::Similarity => "similarity",
        }
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(SearchMode::Exact),
            "comprehensive" => Ok(SearchMode::Comprehensive),
            "contains" => Ok(SearchMode::Contains),
            "similarity" => Ok(SearchMode::Similarity),
            other => Err(Error::InvalidQuery(format!("unknown search mode {other:?}"))),
        }
    }
}

/// One result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub asset_path: PathBuf,
    pub external_ref: Option<String>,
    pub status: RecordStatus,
    pub excerpt: String,
    pub created_at: DateTime<Utc>,
    /// Hamming distance, image queries only.
    pub distance: Option<u32>,
    /// `1 - distance / 64`, image queries only.
    pub similarity: Option<f32>,
}

/// The caller's limit, or the configured default. Zero and anything above
/// the configured maximum are rejected.
pub fn resolve_limit(limit: Option<usize>, config: &SearchConfig) -> Result<usize> {
    let limit = limit.unwrap_or(config.default_limit);
    if limit == 0 {
        return Err(Error::InvalidQuery("limit must be at least 1".to_string()));
    }
    if limit > config.max_limit {
        return Err(Error::InvalidQuery(format!(
            "limit {limit} exceeds the maximum of {}",
            config.max_limit
        )));
    }
    Ok(limit)
}

/// Text query in one of the three text modes. Newest records first.
pub fn search_text(
    index: &ImageIndex,
    mode: SearchMode,
    query: &str,
    limit: Option<usize>,
) -> Result<Vec<SearchHit>> {
    let limit = resolve_limit(limit, index.search_config())?;
    let query = query.trim();
    if query.is_empty() {
        return Err(Error::InvalidQuery("empty keyword".to_string()));
    }

    let snapshot = index.cache().snapshot();
    let mut matched: Vec<&CachedText> = match mode {
        SearchMode::Exact => {
            let folded = fold(query);
            snapshot
                .iter()
                .filter(|entry| entry.normalized.contains(&folded))
                .collect()
        }
        SearchMode::Comprehensive => {
            let folded = fold(query);
            let tokens = tokenize(&folded);
            snapshot
                .iter()
                .filter(|entry| {
                    entry.normalized.contains(&folded)
                        || tokens.iter().any(|t| entry.normalized.contains(t.as_str()))
                })
                .collect()
        }
        SearchMode::Contains => {
            let raw = normalize_width_and_case(query);
            snapshot
                .iter()
                .filter(|entry| entry.normalized.contains(&raw) || entry.variant.contains(&raw))
                .collect()
        }
        SearchMode::Similarity => {
            return Err(Error::InvalidQuery(
                "similarity search takes an image, not keywords".to_string(),
            ))
        }
    };

    matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    matched.truncate(limit);

    tracing::debug!(mode = mode.as_str(), query, hits = matched.len(), "Text search");

    let ids: Vec<i64> = matched.iter().map(|entry| entry.id).collect();
    let excerpt_chars = index.search_config().excerpt_chars;
    let hits = index
        .db()
        .get_many(&ids)?
        .iter()
        .map(|record| to_hit(record, excerpt_chars, None))
        .collect();
    Ok(hits)
}

/// Image query: the exact duplicate first, then perceptual matches within
/// the similarity threshold by ascending distance.
pub fn search_image(
    index: &ImageIndex,
    bytes: &[u8],
    limit: Option<usize>,
) -> Result<Vec<SearchHit>> {
    let limit = resolve_limit(limit, index.search_config())?;
    let fingerprints = fingerprint::compute_fingerprints(bytes)?;
    search_fingerprints(index, &fingerprints, None, limit)
}

/// Shared by image queries and "search after ingest". `exclude` keeps a
/// record (the one just ingested) out of the results.
pub(crate) fn search_fingerprints(
    index: &ImageIndex,
    fingerprints: &Fingerprints,
    exclude: Option<i64>,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    let db = index.db();
    let config = index.search_config();

    let duplicate = db
        .find_by_content(&fingerprints.content)?
        .filter(|id| Some(*id) != exclude);

    let similar = fingerprint::find_similar(
        db,
        &fingerprints.perceptual,
        config.similarity_threshold,
        limit + 2,
    )?;

    let mut ranked: Vec<(i64, u32)> = Vec::with_capacity(limit);
    if let Some(id) = duplicate {
        ranked.push((id, 0));
    }
    ranked.extend(
        similar
            .into_iter()
            .filter(|m| Some(m.id) != duplicate && Some(m.id) != exclude)
            .map(|m| (m.id, m.distance)),
    );
    ranked.truncate(limit);

    let ids: Vec<i64> = ranked.iter().map(|(id, _)| *id).collect();
    let records = db.get_many(&ids)?;

    let hits = records
        .iter()
        .zip(ranked.iter())
        .map(|(record, (_, distance))| to_hit(record, config.excerpt_chars, Some(*distance)))
        .collect();
    Ok(hits)
}

fn to_hit(record: &ImageRecord, excerpt_chars: usize, distance: Option<u32>) -> SearchHit {
    SearchHit {
        id: record.id,
        asset_path: record.asset_path.clone(),
        external_ref: record.external_ref.clone(),
        status: record.status,
        excerpt: excerpt(record.text.as_deref().unwrap_or_default(), excerpt_chars),
        created_at: record.created_at,
        distance,
        similarity: distance.map(fingerprint::similarity),
    }
}

/// The first `max_chars` characters, with "..." when something was cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_tokens() {
        assert_eq!("exact".parse::<SearchMode>().unwrap(), SearchMode::Exact);
        assert_eq!(" Contains ".parse::<SearchMode>().unwrap(), SearchMode::Contains);
        assert!(matches!("fuzzy".parse::<SearchMode>(), Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_resolve_limit() {
        let config = SearchConfig::default();
        assert_eq!(resolve_limit(None, &config).unwrap(), config.default_limit);
        assert_eq!(resolve_limit(Some(2), &config).unwrap(), 2);
        assert!(matches!(resolve_limit(Some(0), &config), Err(Error::InvalidQuery(_))));
        assert!(matches!(
            resolve_limit(Some(config.max_limit + 1), &config),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("short", 100), "short");
        assert_eq!(excerpt("增值税发票", 3), "增值税...");
        assert_eq!(excerpt("", 10), "");
    }
}
