//! Text normalization, noise filtering, segmentation and the text cache.

pub mod cache;
pub mod filter;
pub mod fold;
pub mod segment;

pub use cache::{CachedText, TextCache};
pub use filter::{apply_filters, TextFilter};
pub use fold::{fold, fold_with_variant, normalize_width_and_case};
pub use segment::tokenize;
