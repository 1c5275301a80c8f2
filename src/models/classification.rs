use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::UNKNOWN_CATEGORY;

/// One voter's opinion about one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Voter name
    pub voter: String,
    pub weight: f32,
    pub category: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

impl Vote {
    pub fn is_abstention(&self) -> bool {
        super::is_unknown(&self.category)
    }
}

/// How a classification was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    VotingEnsemble,
    VotingEnsembleWithNli,
    /// Large file classified from its extension only
    SizeFallback,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationMethod::VotingEnsemble => "voting_ensemble",
            ClassificationMethod::VotingEnsembleWithNli => "voting_ensemble_with_nli",
            ClassificationMethod::SizeFallback => "size_fallback",
        }
    }
}

impl fmt::Display for ClassificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub path: PathBuf,
    pub category: String,
    /// Fused strength in [0, 1]
    pub confidence: f32,
    pub method: ClassificationMethod,
    pub keywords: Vec<String>,
    /// File-level embedding, when the text was long enough
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub votes: Vec<Vote>,
    /// Final scoreboard
    pub scores: BTreeMap<String, f32>,
    pub processing_time_ms: u64,
}

impl ClassificationResult {
    /// Unknown result with no votes
    pub fn unknown(path: PathBuf, method: ClassificationMethod) -> Self {
        Self {
            path,
            category: UNKNOWN_CATEGORY.to_string(),
            confidence: 0.0,
            method,
            keywords: Vec::new(),
            embedding: None,
            votes: Vec::new(),
            scores: BTreeMap::new(),
            processing_time_ms: 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        super::is_unknown(&self.category)
    }
}
