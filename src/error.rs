//! Error taxonomy for the indexing core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Control outcome: an image with the same content fingerprint is already indexed.
    #[error("image already indexed as record {existing_id}")]
    DuplicateFingerprint { existing_id: i64 },

    #[error("record {0} not found")]
    RecordNotFound(i64),

    #[error("record {id} already has external reference {existing:?}")]
    ReferenceAlreadySet { id: i64, existing: String },

    /// The recognition capability could not be acquired. Fatal for the current batch only.
    #[error("recognition engine unavailable: {0}")]
    RecognitionUnavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
