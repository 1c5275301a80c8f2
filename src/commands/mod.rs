//! Operations exposed to the CLI
//!
//! [`AppState`] builds every component once from [`Settings`] and hands out
//! shared handles; the submodules implement the individual operations on
//! top of it.

pub mod atlas;
pub mod classify;
pub mod wal;
pub mod watcher;

pub use atlas::*;
pub use classify::*;
pub use wal::*;
pub use watcher::*;

use crate::atlas::{Atlas, AtlasConfig, LoadOutcome};
use crate::classify::{CategoryCatalog, VoterResources, VoterThresholds, VotingEngine};
use crate::config::{ConfigError, Settings};
use crate::enrich::{ContentEnricher, Enricher};
use crate::execution::{ExecutionError, TransactionalExecutor};
use crate::ledger::FileLedger;
use crate::memory::SemanticMemory;
use crate::nli::{LexicalReasoner, NliReasoner};
use crate::services::watcher::WatcherError;
use crate::services::{create_watcher_handle, Processor, WatcherHandle};
use crate::session::SessionTracker;
use crate::vector::{Embedder, HashingEmbedder};
use crate::wal::StoreError;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    #[error("{0} lock poisoned")]
    Poisoned(&'static str),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// The embedding provider selected by the build
pub fn build_embedder(settings: &Settings) -> Arc<dyn Embedder> {
    #[cfg(feature = "fastembed")]
    {
        match crate::vector::FastEmbedder::new() {
            Ok(embedder) => return Arc::new(embedder),
            Err(e) => tracing::warn!("Local embedding model unavailable, using hashing embedder: {}", e),
        }
    }

    Arc::new(HashingEmbedder::new(settings.embedding_dimension))
}

/// Every long-lived component, constructed once
pub struct AppState {
    pub settings: Arc<Settings>,
    pub embedder: Arc<dyn Embedder>,
    pub enricher: Arc<dyn Enricher>,
    pub engine: Arc<VotingEngine>,
    pub atlas: Arc<RwLock<Atlas>>,
    pub executor: Arc<TransactionalExecutor>,
    pub ledger: Arc<FileLedger>,
    pub watcher: WatcherHandle,
}

impl AppState {
    /// Build the default component graph for `settings`
    pub fn new(settings: Settings) -> Result<Self, CommandError> {
        let embedder = build_embedder(&settings);
        Self::with_components(
            settings,
            embedder,
            Arc::new(ContentEnricher::new()),
            Arc::new(LexicalReasoner::default()),
        )
    }

    /// Build the graph around the given providers
    pub fn with_components(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        enricher: Arc<dyn Enricher>,
        nli: Arc<dyn NliReasoner>,
    ) -> Result<Self, CommandError> {
        std::fs::create_dir_all(&settings.data_dir).map_err(|source| StoreError::Read {
            path: settings.data_dir.clone(),
            source,
        })?;
        tracing::info!(
            data_dir = %settings.data_dir.display(),
            embedder = embedder.name(),
            reasoner = nli.name(),
            dry_run = settings.dry_run,
            "Initializing"
        );

        let atlas_config = AtlasConfig {
            max_depth: settings.atlas_max_depth,
            ..AtlasConfig::default()
        };
        let mut atlas = Atlas::new(settings.atlas_index_path(), embedder.clone(), atlas_config);
        match atlas.load()? {
            LoadOutcome::Loaded(n) => tracing::info!("[Atlas] Loaded {} clusters", n),
            LoadOutcome::Missing => tracing::info!("[Atlas] No index yet; run an index scan"),
            LoadOutcome::NeedsRebuild(reason) => tracing::warn!("[Atlas] {}", reason),
        }

        let mut catalog = CategoryCatalog::new(embedder.clone());
        let added = catalog.add_dynamic_categories(settings.category_map.keys().map(String::as_str));
        let folder_names: Vec<String> = atlas.clusters().map(|c| c.name()).collect();
        let discovered = catalog.add_dynamic_categories(folder_names.iter().map(String::as_str));
        tracing::debug!(mapped = added, discovered, "Dynamic categories added");

        let memory = SemanticMemory::open(
            settings.memory_path(),
            embedder.clone(),
            settings.max_memory_entries,
        )?;

        let resources = VoterResources {
            embedder: embedder.clone(),
            catalog: Arc::new(RwLock::new(catalog)),
            memory: Arc::new(RwLock::new(memory)),
            session: Arc::new(SessionTracker::new(settings.session_window_minutes)),
            nli,
            thresholds: VoterThresholds {
                classification: settings.classification_threshold,
                semantic_memory: settings.semantic_memory_threshold,
                memory_recall: settings.memory_recall_threshold,
            },
        };
        let engine = VotingEngine::new(Arc::new(resources), enricher.clone())
            .with_escalation_threshold(settings.escalation_threshold);

        let executor = TransactionalExecutor::open(settings.transactions_path(), settings.dry_run)?;
        let ledger = FileLedger::open(settings.ledger_path())?;

        Ok(Self {
            settings: Arc::new(settings),
            embedder,
            enricher,
            engine: Arc::new(engine),
            atlas: Arc::new(RwLock::new(atlas)),
            executor: Arc::new(executor),
            ledger: Arc::new(ledger),
            watcher: create_watcher_handle(),
        })
    }

    /// A processor sharing this state's components
    pub fn processor(&self) -> Processor {
        Processor::new(
            self.settings.clone(),
            self.engine.clone(),
            self.atlas.clone(),
            self.executor.clone(),
            self.ledger.clone(),
        )
    }
}
