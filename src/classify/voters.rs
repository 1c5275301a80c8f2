//! Voters
//!
//! Each voter turns a [`FileContext`] into a `(category, confidence)`
//! opinion. `Unknown` with confidence 0.0 means "no opinion". The set is
//! closed; the engine iterates it generically.

use super::categories::{classify_by_extension, CategoryCatalog};
use super::keywords::{word_tokens, SEMANTIC_TOKEN_LIMIT};
use crate::memory::SemanticMemory;
use crate::models::{is_unknown, FileContext, Vote, UNKNOWN_CATEGORY};
use crate::nli::{premise_for, NliReasoner};
use crate::session::{dominant, SessionTracker};
use crate::utils::truncate_chars;
use crate::vector::{EmbedError, Embedder};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Characters of text embedded by the history voter
pub const HISTORY_TEXT_CHARS: usize = 500;

/// Confidence attached to an NLI answer
pub const NLI_CONFIDENCE: f32 = 0.85;

/// Session share a category must exceed before the session voter speaks
const SESSION_MIN_SHARE: f32 = 0.5;

/// Upper bound on the session voter's confidence
const SESSION_MAX_CONFIDENCE: f32 = 0.9;

/// Internal voter failure; the engine turns it into an abstention
#[derive(Debug, Error)]
pub enum VoteError {
    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}

/// Thresholds the voters read from settings
#[derive(Debug, Clone, Copy)]
pub struct VoterThresholds {
    /// Minimum category-anchor similarity for the semantic voter
    pub classification: f32,
    /// Memory recall threshold used inside keyword classification
    pub semantic_memory: f32,
    /// Memory recall threshold for the history voter
    pub memory_recall: f32,
}

impl Default for VoterThresholds {
    fn default() -> Self {
        Self {
            classification: 0.10,
            semantic_memory: 0.75,
            memory_recall: 0.70,
        }
    }
}

/// Everything voters consult, shared with the worker pool
pub struct VoterResources {
    pub embedder: Arc<dyn Embedder>,
    pub catalog: Arc<RwLock<CategoryCatalog>>,
    pub memory: Arc<RwLock<SemanticMemory>>,
    pub session: Arc<SessionTracker>,
    pub nli: Arc<dyn NliReasoner>,
    pub thresholds: VoterThresholds,
}

/// The closed set of voting strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voter {
    /// MIME type and extension
    FileType,
    /// Keyword embedding against category anchors and memory
    Semantic,
    /// Nearest learned example
    History,
    /// Dominant category of the current session
    Session,
    /// Natural-language inference, only on escalation
    Nli,
}

impl Voter {
    /// Voters dispatched for every file
    pub const FAST: [Voter; 4] = [Voter::FileType, Voter::Semantic, Voter::History, Voter::Session];

    pub fn name(&self) -> &'static str {
        match self {
            Voter::FileType => "FileType",
            Voter::Semantic => "Semantic",
            Voter::History => "History",
            Voter::Session => "Session",
            Voter::Nli => "NLI",
        }
    }

    /// Fixed trust weight; learned and reasoned signals weigh most
    pub fn weight(&self) -> f32 {
        match self {
            Voter::FileType => 0.3,
            Voter::Semantic => 0.6,
            Voter::History => 0.8,
            Voter::Session => 0.5,
            Voter::Nli => 0.9,
        }
    }

    /// Wrap a raw opinion into a [`Vote`]
    pub fn cast(&self, category: impl Into<String>, confidence: f32) -> Vote {
        Vote {
            voter: self.name().to_string(),
            weight: self.weight(),
            category: category.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// This voter's abstention
    pub fn abstain(&self) -> Vote {
        self.cast(UNKNOWN_CATEGORY, 0.0)
    }

    /// Produce an opinion about `ctx`
    pub fn vote(&self, ctx: &FileContext, res: &VoterResources) -> Result<Vote, VoteError> {
        let (category, confidence) = match self {
            Voter::FileType => file_type_vote(ctx),
            Voter::Semantic => semantic_vote(ctx, res)?,
            Voter::History => history_vote(ctx, res)?,
            Voter::Session => session_vote(&res.session),
            Voter::Nli => nli_vote(ctx, res)?,
        };

        if is_unknown(&category) {
            return Ok(self.abstain());
        }
        Ok(self.cast(category, confidence))
    }
}

fn unknown() -> (String, f32) {
    (UNKNOWN_CATEGORY.to_string(), 0.0)
}

fn file_type_vote(ctx: &FileContext) -> (String, f32) {
    let mime = ctx.mime_type.as_str();
    if mime.starts_with("image/") {
        return ("Images".into(), 0.9);
    }
    if mime.starts_with("video/") {
        return ("Video".into(), 0.9);
    }
    if mime.starts_with("audio/") {
        return ("Audio".into(), 0.9);
    }
    if mime.starts_with("text/x-python") || ctx.extension() == "py" {
        return ("Code".into(), 0.8);
    }
    if mime == "application/pdf" {
        return ("Documents".into(), 0.5);
    }

    match classify_by_extension(&ctx.path) {
        UNKNOWN_CATEGORY => unknown(),
        category => (category.to_string(), 0.6),
    }
}

fn semantic_vote(ctx: &FileContext, res: &VoterResources) -> Result<(String, f32), VoteError> {
    if ctx.text.is_empty() {
        return Ok(unknown());
    }

    let keywords = word_tokens(&ctx.text, SEMANTIC_TOKEN_LIMIT);
    let catalog = res.catalog.read().map_err(|_| VoteError::Poisoned("catalog"))?;
    let memory = res.memory.read().map_err(|_| VoteError::Poisoned("memory"))?;

    Ok(catalog.classify_by_keywords(
        &keywords,
        Some(&memory),
        res.thresholds.semantic_memory,
        res.thresholds.classification,
    ))
}

fn history_vote(ctx: &FileContext, res: &VoterResources) -> Result<(String, f32), VoteError> {
    if ctx.text.is_empty() {
        return Ok(unknown());
    }

    let embedding = res.embedder.embed(truncate_chars(&ctx.text, HISTORY_TEXT_CHARS))?;
    let memory = res.memory.read().map_err(|_| VoteError::Poisoned("memory"))?;

    match memory.recall(&embedding, res.thresholds.memory_recall) {
        (Some(category), score) => {
            tracing::debug!("History voter recalled '{}' (score: {:.2})", category, score);
            Ok((category, score))
        }
        (None, _) => Ok(unknown()),
    }
}

fn session_vote(session: &SessionTracker) -> (String, f32) {
    let distribution = session.current_context();
    match dominant(&distribution) {
        Some((category, share)) if share > SESSION_MIN_SHARE => {
            (category.to_string(), share.min(SESSION_MAX_CONFIDENCE))
        }
        _ => unknown(),
    }
}

fn nli_vote(ctx: &FileContext, res: &VoterResources) -> Result<(String, f32), VoteError> {
    if ctx.text.is_empty() {
        return Ok(unknown());
    }

    let labels = res
        .catalog
        .read()
        .map_err(|_| VoteError::Poisoned("catalog"))?
        .names()
        .to_vec();
    let premise = premise_for(&ctx.path.to_string_lossy(), &ctx.text);

    Ok(match res.nli.reason(&premise, &labels) {
        Some(label) => (label, NLI_CONFIDENCE),
        None => unknown(),
    })
}
