//! Text and image queries against a populated index.

mod common;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashSet;

use common::{encode, fixture, image, ingest, png};
use picseek::{Error, SearchMode};

fn ids(hits: &[picseek::SearchHit]) -> Vec<i64> {
    hits.iter().map(|h| h.id).collect()
}

#[test]
fn comprehensive_contains_every_exact_hit() {
    let fx = fixture();
    for (seed, text) in [
        (1, "增值税普通发票"),
        (2, "发票抬头 某某公司"),
        (3, "出租车票据"),
        (4, "火车票 北京南"),
        (5, "購物收據"),
    ] {
        ingest(&fx.index, seed, Some(text));
    }

    let limit = Some(fx.index.search_config().max_limit);
    for keyword in ["发票", "增值税发票", "车票", "收据", "北京", "公司发票"] {
        let exact: HashSet<i64> =
            ids(&fx.index.search_text(SearchMode::Exact, keyword, limit).unwrap())
                .into_iter()
                .collect();
        let comprehensive: HashSet<i64> =
            ids(&fx.index.search_text(SearchMode::Comprehensive, keyword, limit).unwrap())
                .into_iter()
                .collect();
        assert!(exact.is_subset(&comprehensive), "keyword {keyword}");
    }

    // Segments widen the match beyond the literal phrase.
    let exact = fx.index.search_text(SearchMode::Exact, "增值税发票", limit).unwrap();
    let comprehensive = fx
        .index
        .search_text(SearchMode::Comprehensive, "增值税发票", limit)
        .unwrap();
    assert!(exact.is_empty());
    assert!(comprehensive.len() >= 2);
}

#[test]
fn exact_matches_across_scripts() {
    let fx = fixture();
    let traditional = ingest(&fx.index, 1, Some("電子發票"));
    let simplified = ingest(&fx.index, 2, Some("电子发票"));

    for query in ["發票", "发票", "電子发票"] {
        let found: HashSet<i64> =
            ids(&fx.index.search_text(SearchMode::Exact, query, Some(10)).unwrap())
                .into_iter()
                .collect();
        assert_eq!(found, HashSet::from([traditional, simplified]), "query {query}");
    }
}

#[test]
fn exact_simplified_query_finds_traditional_text() {
    let fx = fixture();
    let id = ingest(&fx.index, 1, Some("商業發票 專用"));

    for query in ["商业发票", "专用", "商業发票"] {
        let hits = fx.index.search_text(SearchMode::Exact, query, None).unwrap();
        assert_eq!(ids(&hits), vec![id], "query {query}");
    }
}

#[test]
fn contains_matches_either_stored_form() {
    let fx = fixture();
    let id = ingest(&fx.index, 1, Some("發票 NO.42"));

    let hits = fx.index.search_text(SearchMode::Contains, "發票", None).unwrap();
    assert_eq!(ids(&hits), vec![id]);
    let hits = fx.index.search_text(SearchMode::Contains, "no.42", None).unwrap();
    assert_eq!(ids(&hits), vec![id]);
    assert!(fx.index.search_text(SearchMode::Contains, "收据", None).unwrap().is_empty());
}

#[test]
fn limit_keeps_most_recent() {
    let fx = fixture();
    let all: Vec<i64> = (1..=5)
        .map(|seed| ingest(&fx.index, seed, Some(&format!("收据 第{seed}张"))))
        .collect();

    let hits = fx.index.search_text(SearchMode::Exact, "收据", Some(2)).unwrap();
    assert_eq!(ids(&hits), vec![all[4], all[3]]);
    assert!(hits[0].created_at >= hits[1].created_at);

    let hits = fx.index.search_text(SearchMode::Exact, "收据", None).unwrap();
    assert_eq!(hits.len(), fx.index.search_config().default_limit);
}

#[test]
fn malformed_queries_are_rejected() {
    let fx = fixture();
    ingest(&fx.index, 1, Some("发票"));
    let max = fx.index.search_config().max_limit;

    let cases = [
        fx.index.search_text(SearchMode::Exact, "   ", None),
        fx.index.search_text(SearchMode::Exact, "发票", Some(0)),
        fx.index.search_text(SearchMode::Exact, "发票", Some(max + 1)),
        fx.index.search_text(SearchMode::Similarity, "发票", None),
    ];
    for result in cases {
        assert!(matches!(result, Err(Error::InvalidQuery(_))));
    }
    assert!(matches!(
        fx.index.search_image(&png(1), Some(0)),
        Err(Error::InvalidQuery(_))
    ));
}

#[test]
fn excerpt_is_truncated() {
    let fx = fixture();
    let long = "发票".repeat(80);
    ingest(&fx.index, 1, Some(&long));

    let hits = fx.index.search_text(SearchMode::Exact, "发票", None).unwrap();
    let excerpt_chars = fx.index.search_config().excerpt_chars;
    assert_eq!(hits[0].excerpt.chars().count(), excerpt_chars + 3);
    assert!(hits[0].excerpt.ends_with("..."));
    assert_eq!(hits[0].distance, None);
}

#[test]
fn image_search_puts_duplicate_first() {
    let fx = fixture();
    let original = ingest(&fx.index, 1, Some("原图"));
    let checkerboard = RgbImage::from_fn(16, 16, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    });
    let other = encode(&DynamicImage::ImageRgb8(checkerboard), ImageFormat::Png);
    fx.index.ingest(&other, &Default::default()).unwrap();

    let hits = fx.index.search_image(&png(1), None).unwrap();
    assert_eq!(hits[0].id, original);
    assert_eq!(hits[0].distance, Some(0));
    assert_eq!(hits[0].similarity, Some(1.0));
    assert_eq!(hits.iter().filter(|h| h.id == original).count(), 1);

    // Same pixels in another container: no byte match, perceptually identical.
    let bmp = encode(&image(1), ImageFormat::Bmp);
    let hits = fx.index.search_image(&bmp, None).unwrap();
    assert_eq!(hits[0].id, original);
    assert_eq!(hits[0].distance, Some(0));

    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[test]
fn image_search_on_empty_index() {
    let fx = fixture();
    assert!(fx.index.search_image(&png(9), None).unwrap().is_empty());
}
