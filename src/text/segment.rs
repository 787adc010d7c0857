//! Query segmentation for comprehensive search.

use jieba_rs::Jieba;
use once_cell::sync::Lazy;

static JIEBA: Lazy<Jieba> = Lazy::new(Jieba::new);

/// Tokens shorter than this (in characters) carry too little signal to match on.
const MIN_TOKEN_CHARS: usize = 2;

/// Split a query into search tokens. Chinese goes through jieba in search
/// mode; Latin words come out whole. Duplicates are removed, order kept.
pub fn tokenize(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();

    for word in JIEBA.cut_for_search(query.trim(), true) {
        let word = word.trim();
        if word.chars().count() < MIN_TOKEN_CHARS {
            continue;
        }
        let word = word.to_lowercase();
        if !tokens.contains(&word) {
            tokens.push(word);
        }
    }

    tokens
}
