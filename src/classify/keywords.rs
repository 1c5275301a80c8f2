//! Keyword extraction helpers

use crate::models::FileContext;
use regex::Regex;
use std::sync::OnceLock;

/// Word tokens fed to the semantic voter
pub const SEMANTIC_TOKEN_LIMIT: usize = 50;

/// Whitespace tokens appended to a result's keyword list
pub const RESULT_TOKEN_LIMIT: usize = 10;

/// Keywords used to build an atlas search query
const QUERY_KEYWORD_LIMIT: usize = 5;

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\w+").expect("static regex"))
}

/// First `limit` lowercased `\w+` tokens of `text`
pub fn word_tokens(text: &str, limit: usize) -> Vec<String> {
    let lower = text.to_lowercase();
    word_regex()
        .find_iter(&lower)
        .take(limit)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Metadata keys followed by the first whitespace-separated text tokens
pub fn result_keywords(ctx: &FileContext) -> Vec<String> {
    ctx.metadata
        .keys()
        .cloned()
        .chain(
            ctx.text
                .split_whitespace()
                .take(RESULT_TOKEN_LIMIT)
                .map(str::to_string),
        )
        .collect()
}

/// Space-joined query from up to five keywords longer than three characters
pub fn search_query(keywords: &[String]) -> Option<String> {
    let picked: Vec<&str> = keywords
        .iter()
        .map(String::as_str)
        .filter(|k| k.chars().count() > 3)
        .take(QUERY_KEYWORD_LIMIT)
        .collect();

    if picked.is_empty() {
        None
    } else {
        Some(picked.join(" "))
    }
}
