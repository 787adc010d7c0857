//! Content and perceptual fingerprints.
//!
//! The content fingerprint is a SHA-256 of the raw bytes and decides exact
//! duplicates. The perceptual fingerprint is a 64-bit DCT mean hash that
//! survives re-encoding and light edits; two images are similar when the
//! Hamming distance between their hashes is small.

use anyhow::anyhow;
use base64::{engine::general_purpose::STANDARD, Engine};
use img_hash::{HashAlg, HasherConfig};
use md5::Md5;
use sha2::{Digest, Sha256};

use crate::db::Database;
use crate::error::{Error, Result};

/// Bits in a perceptual hash; also the distance reported for hashes that
/// cannot be compared.
pub const HASH_BITS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprints {
    /// SHA-256 hex.
    pub content: String,
    /// Perceptual hash, base64.
    pub perceptual: String,
    pub md5: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimilarMatch {
    pub id: i64,
    pub distance: u32,
}

/// Hash the bytes and decode them as an image. Bytes that are not an image
/// are rejected with `InvalidImage`.
pub fn compute_fingerprints(bytes: &[u8]) -> Result<Fingerprints> {
    let img = image::load_from_memory(bytes).map_err(|e| Error::InvalidImage(e.to_string()))?;
    let perceptual = perceptual_hash(&img).map_err(|e| Error::InvalidImage(e.to_string()))?;

    Ok(Fingerprints {
        content: format!("{:x}", Sha256::digest(bytes)),
        perceptual,
        md5: format!("{:x}", Md5::digest(bytes)),
    })
}

fn perceptual_hash(img: &image::DynamicImage) -> anyhow::Result<String> {
    // Hashing only needs a small image; shrink first so large photos stay cheap.
    let thumbnail = img.thumbnail(64, 64);

    let hasher = HasherConfig::new()
        .hash_size(8, 8)
        .hash_alg(HashAlg::Mean)
        .preproc_dct()
        .to_hasher();

    let rgba = thumbnail.to_rgba8();
    let (width, height) = rgba.dimensions();

    let img_hash_image = img_hash::image::RgbaImage::from_raw(width, height, rgba.into_raw())
        .ok_or_else(|| anyhow!("Failed to create image for hashing"))?;

    let hash = hasher.hash_image(&img_hash::image::DynamicImage::ImageRgba8(img_hash_image));
    Ok(hash.to_base64())
}

/// Hamming distance between two base64 perceptual hashes. Hashes that do not
/// decode or differ in width compare at [`HASH_BITS`].
pub fn hamming_distance(a: &str, b: &str) -> u32 {
    let (Ok(a), Ok(b)) = (STANDARD.decode(a), STANDARD.decode(b)) else {
        return HASH_BITS;
    };
    if a.len() != b.len() {
        return HASH_BITS;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum::<u32>()
        .min(HASH_BITS)
}

/// `1 - distance / 64`, clamped to `[0, 1]`.
pub fn similarity(distance: u32) -> f32 {
    1.0 - distance.min(HASH_BITS) as f32 / HASH_BITS as f32
}

/// Any record carrying this content fingerprint.
pub fn is_duplicate(db: &Database, content: &str) -> Result<Option<i64>> {
    db.find_by_content(content)
}

/// Records whose perceptual hash is within `max_distance`, closest first.
/// Equal distances put the most recent record first.
pub fn find_similar(
    db: &Database,
    perceptual: &str,
    max_distance: u32,
    limit: usize,
) -> Result<Vec<SimilarMatch>> {
    let mut matches: Vec<(SimilarMatch, chrono::DateTime<chrono::Utc>)> = db
        .list_perceptual()?
        .into_iter()
        .filter_map(|(id, hash, created_at)| {
            let distance = hamming_distance(perceptual, &hash);
            (distance <= max_distance).then_some((SimilarMatch { id, distance }, created_at))
        })
        .collect();

    matches.sort_by(|(a, a_created), (b, b_created)| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| b_created.cmp(a_created))
            .then_with(|| b.id.cmp(&a.id))
    });
    matches.truncate(limit);

    Ok(matches.into_iter().map(|(m, _)| m).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_same_pixels_different_encoding() {
        let img = gradient(32, 32);
        let png = compute_fingerprints(&encode(&img, ImageFormat::Png)).unwrap();
        let bmp = compute_fingerprints(&encode(&img, ImageFormat::Bmp)).unwrap();

        assert_ne!(png.content, bmp.content);
        assert_eq!(hamming_distance(&png.perceptual, &bmp.perceptual), 0);
        assert_eq!(png.content.len(), 64);
        assert_eq!(png.md5.len(), 32);
    }

    #[test]
    fn test_invalid_image() {
        assert!(matches!(
            compute_fingerprints(b"definitely not an image"),
            Err(Error::InvalidImage(_))
        ));
    }

    #[test]
    fn test_hamming_distance() {
        let zeros = STANDARD.encode([0u8; 8]);
        let ones = STANDARD.encode([0xffu8; 8]);
        let three = STANDARD.encode([0b0000_0111u8, 0, 0, 0, 0, 0, 0, 0]);

        assert_eq!(hamming_distance(&zeros, &zeros), 0);
        assert_eq!(hamming_distance(&zeros, &three), 3);
        assert_eq!(hamming_distance(&zeros, &ones), 64);
    }

    #[test]
    fn test_mismatched_widths_compare_at_max() {
        let short = STANDARD.encode([0u8; 4]);
        let long = STANDARD.encode([0u8; 8]);
        assert_eq!(hamming_distance(&short, &long), HASH_BITS);
        assert_eq!(hamming_distance("!!!", &long), HASH_BITS);
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity(0), 1.0);
        assert_eq!(similarity(16), 0.75);
        assert_eq!(similarity(64), 0.0);
        assert_eq!(similarity(100), 0.0);
    }
}
