//! Ensemble classification
//!
//! - `categories`: category anchors, extension table, keyword matching
//! - `keywords`: tokenizers for voters, results and atlas queries
//! - `voters`: the closed set of voting strategies
//! - `engine`: concurrent dispatch, arbitration and NLI escalation

pub mod categories;
pub mod engine;
pub mod keywords;
pub mod voters;

pub use categories::{classify_by_extension, CategoryCatalog};
pub use engine::{arbitrate, should_escalate, Arbitration, VotingEngine};
pub use voters::{Voter, VoterResources, VoterThresholds};
