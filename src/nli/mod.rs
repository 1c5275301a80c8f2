//! Natural-language inference fallback
//!
//! The reasoner picks the label that a premise (file path plus a text
//! snippet) best supports. It is the expensive last resort of the voting
//! engine and of destination routing, so implementations return `None`
//! instead of guessing when nothing is clearly supported.

use crate::utils::truncate_chars;
use std::collections::BTreeSet;

/// Premise text is truncated to this many characters
pub const MAX_PREMISE_CHARS: usize = 1000;

/// `(premise, candidate labels) -> label`
pub trait NliReasoner: Send + Sync {
    /// Best supported label, or `None` when the reasoner abstains
    fn reason(&self, premise: &str, labels: &[String]) -> Option<String>;

    /// Reasoner name for logs
    fn name(&self) -> &str;
}

/// Build the premise shown to a reasoner for one file
pub fn premise_for(path: &str, text: &str) -> String {
    format!("{}\n{}", path, truncate_chars(text, MAX_PREMISE_CHARS))
}

/// Token-overlap reasoner used when no inference model is configured.
///
/// A label scores the fraction of its words (humanized, 3+ chars) found in
/// the premise; the best label wins if its score exceeds `min_score`.
#[derive(Debug, Clone)]
pub struct LexicalReasoner {
    min_score: f32,
}

impl Default for LexicalReasoner {
    fn default() -> Self {
        Self { min_score: 0.5 }
    }
}

impl LexicalReasoner {
    pub fn new(min_score: f32) -> Self {
        Self { min_score }
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(|w| w.to_lowercase())
}

impl NliReasoner for LexicalReasoner {
    fn reason(&self, premise: &str, labels: &[String]) -> Option<String> {
        if labels.is_empty() || premise.trim().is_empty() {
            return None;
        }

        let premise_words: BTreeSet<String> = words(premise).collect();
        let mut best: Option<(&String, f32)> = None;

        for label in labels {
            let label_words: Vec<String> = words(label).collect();
            if label_words.is_empty() {
                continue;
            }
            let hits = label_words.iter().filter(|w| premise_words.contains(*w)).count();
            let score = hits as f32 / label_words.len() as f32;

            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((label, score));
            }
        }

        match best {
            Some((label, score)) if score > self.min_score => {
                tracing::info!("NLI decision: {} (score: {:.2})", label, score);
                Some(label.clone())
            }
            _ => None,
        }
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_picks_supported_label() {
        let reasoner = LexicalReasoner::default();
        let premise = premise_for("/dl/scan.txt", "Quarterly tax return for the finance team");

        let label = reasoner.reason(&premise, &labels(&["Code", "Finance", "Tax_Returns"]));
        assert_eq!(label.as_deref(), Some("Finance"));
    }

    #[test]
    fn test_abstains_without_support() {
        let reasoner = LexicalReasoner::default();
        assert_eq!(reasoner.reason("holiday pictures", &labels(&["Finance", "Code"])), None);
        assert_eq!(reasoner.reason("", &labels(&["Finance"])), None);
        assert_eq!(reasoner.reason("finance", &[]), None);
    }

    #[test]
    fn test_partial_label_match_needs_majority() {
        let reasoner = LexicalReasoner::default();
        let candidates = labels(&["Machine_Learning_Notes"]);
        assert_eq!(reasoner.reason("machine shop manual", &candidates), None);
        assert_eq!(
            reasoner.reason("machine learning lecture", &candidates).as_deref(),
            Some("Machine_Learning_Notes")
        );
    }

    #[test]
    fn test_premise_is_truncated() {
        let premise = premise_for("/a.txt", &"x".repeat(5000));
        assert_eq!(premise.chars().count(), "/a.txt\n".len() + MAX_PREMISE_CHARS);
    }
}
