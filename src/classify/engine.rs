//! Voting engine
//!
//! Runs the fast voters concurrently on a small blocking pool, fuses their
//! votes into a weighted scoreboard and escalates to the NLI voter only when
//! the outcome is ambiguous.

use super::keywords::result_keywords;
use super::voters::{Voter, VoterResources};
use crate::enrich::Enricher;
use crate::models::{
    is_unknown, ClassificationMethod, ClassificationResult, FileContext, Vote, UNKNOWN_CATEGORY,
};
use crate::utils::truncate_chars;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Concurrent voter invocations per file
pub const VOTER_POOL_SIZE: usize = 2;

/// Below this fused confidence the NLI voter is consulted
pub const DEFAULT_ESCALATION_THRESHOLD: f32 = 0.60;

/// Text shorter than this (trimmed) is not embedded
const MIN_EMBED_TEXT_CHARS: usize = 20;

/// Characters of text used for the file-level embedding
const EMBED_TEXT_CHARS: usize = 512;

/// Outcome of one arbitration round
#[derive(Debug, Clone, PartialEq)]
pub struct Arbitration {
    pub category: String,
    /// `min(score[winner], 1.0)`
    pub confidence: f32,
    pub scores: BTreeMap<String, f32>,
}

/// Fuse votes: `score[category] += weight * confidence`, winner is the
/// arg-max. Abstentions are ignored. Equal scores resolve to the
/// alphabetically first category so the result is deterministic.
pub fn arbitrate(votes: &[Vote]) -> Arbitration {
    let mut scores: BTreeMap<String, f32> = BTreeMap::new();
    for vote in votes.iter().filter(|v| !v.is_abstention()) {
        *scores.entry(vote.category.clone()).or_default() += vote.weight * vote.confidence;
    }

    let mut winner: Option<(&String, f32)> = None;
    for (category, score) in &scores {
        if winner.map_or(true, |(_, best)| *score > best) {
            winner = Some((category, *score));
        }
    }

    let (category, confidence) = match winner {
        Some((category, score)) => (category.clone(), score.clamp(0.0, 1.0)),
        None => (UNKNOWN_CATEGORY.to_string(), 0.0),
    };

    Arbitration {
        category,
        confidence,
        scores,
    }
}

/// Escalate iff (winner unknown OR confidence below threshold) AND the file
/// has text
pub fn should_escalate(category: &str, confidence: f32, text: &str, threshold: f32) -> bool {
    (is_unknown(category) || confidence < threshold) && !text.is_empty()
}

/// Ensemble classifier
pub struct VotingEngine {
    resources: Arc<VoterResources>,
    enricher: Arc<dyn Enricher>,
    pool: Arc<Semaphore>,
    escalation_threshold: f32,
}

impl VotingEngine {
    pub fn new(resources: Arc<VoterResources>, enricher: Arc<dyn Enricher>) -> Self {
        Self {
            resources,
            enricher,
            pool: Arc::new(Semaphore::new(VOTER_POOL_SIZE)),
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
        }
    }

    pub fn with_escalation_threshold(mut self, threshold: f32) -> Self {
        self.escalation_threshold = threshold;
        self
    }

    pub fn resources(&self) -> &Arc<VoterResources> {
        &self.resources
    }

    /// Enrich and classify a file
    pub async fn process(&self, path: &Path) -> ClassificationResult {
        let enricher = self.enricher.clone();
        let owned = path.to_path_buf();
        let ctx = match tokio::task::spawn_blocking(move || enricher.enrich(&owned)).await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Enrichment task failed: {}", e);
                FileContext::from_path(path)
            }
        };

        self.process_context(ctx).await
    }

    /// Classify an already enriched file
    pub async fn process_context(&self, ctx: FileContext) -> ClassificationResult {
        let start = Instant::now();
        let ctx = Arc::new(ctx);
        tracing::debug!(path = %ctx.path.display(), mime = %ctx.mime_type, "Classifying");

        let embedding = self.file_embedding(&ctx).await;

        let fast = join_all(Voter::FAST.iter().map(|voter| self.run_voter(*voter, ctx.clone()))).await;
        let mut votes: Vec<Vote> = fast.into_iter().filter(|v| !v.is_abstention()).collect();

        let mut outcome = arbitrate(&votes);
        let mut method = ClassificationMethod::VotingEnsemble;

        if should_escalate(&outcome.category, outcome.confidence, &ctx.text, self.escalation_threshold) {
            tracing::info!("Confidence {:.2}. Using NLI fallback", outcome.confidence);
            let nli = self.run_voter(Voter::Nli, ctx.clone()).await;
            if !nli.is_abstention() {
                votes.push(nli);
                outcome = arbitrate(&votes);
                method = ClassificationMethod::VotingEnsembleWithNli;
            }
        }

        if !is_unknown(&outcome.category) {
            self.resources
                .session
                .add_event(&ctx.path.to_string_lossy(), &outcome.category);
        }

        let result = ClassificationResult {
            path: ctx.path.clone(),
            category: outcome.category,
            confidence: outcome.confidence,
            method,
            keywords: result_keywords(&ctx),
            embedding,
            votes,
            scores: outcome.scores,
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        tracing::info!(
            file = %ctx.file_name(),
            category = %result.category,
            confidence = format!("{:.2}", result.confidence),
            method = %result.method,
            votes = result.votes.len(),
            "Classified"
        );
        result
    }

    /// Run one voter on the pool; any failure becomes an abstention
    async fn run_voter(&self, voter: Voter, ctx: Arc<FileContext>) -> Vote {
        let Ok(_permit) = self.pool.clone().acquire_owned().await else {
            return voter.abstain();
        };

        let resources = self.resources.clone();
        match tokio::task::spawn_blocking(move || voter.vote(&ctx, &resources)).await {
            Ok(Ok(vote)) => {
                if vote.is_abstention() {
                    tracing::debug!("Voter {} abstained", voter.name());
                }
                vote
            }
            Ok(Err(e)) => {
                tracing::warn!("Voter {} failed: {}", voter.name(), e);
                voter.abstain()
            }
            Err(e) => {
                tracing::warn!("Voter {} panicked: {}", voter.name(), e);
                voter.abstain()
            }
        }
    }

    async fn file_embedding(&self, ctx: &Arc<FileContext>) -> Option<Vec<f32>> {
        if ctx.text.trim().chars().count() <= MIN_EMBED_TEXT_CHARS {
            return None;
        }

        let embedder = self.resources.embedder.clone();
        let ctx = ctx.clone();
        let joined = tokio::task::spawn_blocking(move || {
            embedder.embed(truncate_chars(&ctx.text, EMBED_TEXT_CHARS))
        })
        .await;

        match joined {
            Ok(Ok(embedding)) => Some(embedding),
            Ok(Err(e)) => {
                tracing::warn!("File embedding failed: {}", e);
                None
            }
            Err(e) => {
                tracing::warn!("File embedding task failed: {}", e);
                None
            }
        }
    }
}
