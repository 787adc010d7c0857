//! picseek: fingerprint, recognize and search a private image collection.
//!
//! Images are indexed by a content fingerprint (exact duplicates) and a
//! perceptual fingerprint (near duplicates). Text inside the images is
//! recognized in bounded batches and kept in an in-memory cache that folds
//! traditional and simplified Chinese together, so text queries match across
//! both scripts.

pub mod archive;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod logging;
pub mod recognition;
pub mod schedule;
pub mod search;
pub mod text;

pub use config::Config;
pub use coordinator::{Coordinator, RunOutcome};
pub use error::{Error, Result};
pub use index::{ImageIndex, IngestOptions, Ingested};
pub use search::{SearchHit, SearchMode};
