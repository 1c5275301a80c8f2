//! Processor
//!
//! The single consumer of the watcher queue. Each file runs end to end
//! (classification, destination routing, transactional move, feedback)
//! before the next one is dequeued, so the atlas and memory only ever see one
//! writer.

use super::resources::ResourceGuard;
use crate::atlas::{normalize_folder, Atlas};
use crate::classify::classify_by_extension;
use crate::classify::keywords::search_query;
use crate::classify::VotingEngine;
use crate::config::Settings;
use crate::execution::{MoveOutcome, TransactionalExecutor};
use crate::ledger::FileLedger;
use crate::models::{guess_mime, is_unknown, ClassificationMethod, ClassificationResult};
use crate::utils::{format_size, CancellationToken};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Folder (under the first watch directory) for files nobody could classify
pub const NEEDS_REVIEW_FOLDER: &str = "_Needs_Review";

/// Capacity of the watcher → processor queue
pub const QUEUE_CAPACITY: usize = 256;

/// How long the loop waits for a queue entry before re-checking its flags
const QUEUE_POLL: Duration = Duration::from_secs(1);

/// Back-off while paused or under resource pressure
const IDLE_DELAY: Duration = Duration::from_secs(1);

/// Confidence reported for extension-only placement of oversized files
const SIZE_FALLBACK_CONFIDENCE: f32 = 0.6;

/// Keywords handed to the reasoner when naming a new folder
const NLI_KEYWORD_LIMIT: usize = 10;

/// How a destination folder was chosen
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteSource {
    NeedsReview,
    Atlas { score: f32 },
    CategoryMap,
    NliMatch { label: String, score: f32 },
    NliFolderName { label: String, folder_name: String },
    NliNewFolder { label: String },
    CategoryFolder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub folder: PathBuf,
    pub source: RouteSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Missing,
    Ignored,
    RecentlyMoved,
}

/// What happened to one dequeued file
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Skipped {
        path: PathBuf,
        reason: SkipReason,
    },
    Placed {
        result: ClassificationResult,
        route: Route,
        #[serde(rename = "move")]
        moved: MoveOutcome,
    },
    Failed {
        result: ClassificationResult,
        route: Route,
        error: String,
    },
}

/// Make a reasoner-suggested label usable as a single folder name
pub fn sanitize_folder_name(label: &str) -> String {
    label
        .trim()
        .trim_matches(|c| c == '/' || c == '\\')
        .replace(['/', '\\'], "_")
}

/// The file pipeline: classification → routing → move → feedback
#[derive(Clone)]
pub struct Processor {
    settings: Arc<Settings>,
    engine: Arc<VotingEngine>,
    atlas: Arc<RwLock<Atlas>>,
    executor: Arc<TransactionalExecutor>,
    ledger: Arc<FileLedger>,
    guard: ResourceGuard,
    paused: Arc<AtomicBool>,
    stop: CancellationToken,
}

impl Processor {
    pub fn new(
        settings: Arc<Settings>,
        engine: Arc<VotingEngine>,
        atlas: Arc<RwLock<Atlas>>,
        executor: Arc<TransactionalExecutor>,
        ledger: Arc<FileLedger>,
    ) -> Self {
        let guard = ResourceGuard::from_settings(&settings);
        Self {
            settings,
            engine,
            atlas,
            executor,
            ledger,
            guard,
            paused: Arc::new(AtomicBool::new(false)),
            stop: CancellationToken::new(),
        }
    }

    pub fn with_resource_guard(mut self, guard: ResourceGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Finish the file in flight, then leave the loop
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Hold further dequeuing; the file in flight still completes
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        tracing::info!("[Processor] Paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        tracing::info!("[Processor] Resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Consume `queue` until stopped or the queue closes
    pub async fn run(self, mut queue: mpsc::Receiver<PathBuf>) {
        tracing::info!("[Processor] Started");

        while !self.stop.is_cancelled() {
            if self.is_paused() || !self.guard.check() {
                tokio::time::sleep(IDLE_DELAY).await;
                continue;
            }

            match tokio::time::timeout(QUEUE_POLL, queue.recv()).await {
                Ok(Some(path)) => {
                    self.process_one(&path).await;
                }
                Ok(None) => {
                    tracing::info!("[Processor] Queue closed");
                    break;
                }
                Err(_) => continue,
            }
        }

        tracing::info!("[Processor] Stopped");
    }

    /// Run one file through the whole pipeline
    pub async fn process_one(&self, path: &Path) -> ProcessOutcome {
        if let Some(reason) = self.skip_reason(path) {
            tracing::debug!(path = %path.display(), reason = ?reason, "[Processor] Skipping");
            return ProcessOutcome::Skipped {
                path: path.to_path_buf(),
                reason,
            };
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        tracing::info!("[Processor] Processing: {}", file_name);

        let result = match self.oversized(path) {
            Some(size) => {
                tracing::warn!(
                    "[Processor] {} ({}) exceeds size limit. Using basic extension sort",
                    file_name,
                    format_size(size)
                );
                size_fallback(path)
            }
            None => self.engine.process(path).await,
        };

        let this = self.clone();
        let owned = path.to_path_buf();
        match tokio::task::spawn_blocking(move || this.place(&owned, result)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(path = %path.display(), "[Processor] Placement task failed: {}", e);
                let result =
                    ClassificationResult::unknown(path.to_path_buf(), ClassificationMethod::VotingEnsemble);
                ProcessOutcome::Failed {
                    route: Route {
                        folder: self.review_folder(),
                        source: RouteSource::NeedsReview,
                    },
                    result,
                    error: e.to_string(),
                }
            }
        }
    }

    fn skip_reason(&self, path: &Path) -> Option<SkipReason> {
        if !path.is_file() {
            return Some(SkipReason::Missing);
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if file_name.starts_with('.') || self.settings.is_ignored(&file_name) {
            return Some(SkipReason::Ignored);
        }

        if self.executor.is_recently_moved(path) {
            return Some(SkipReason::RecentlyMoved);
        }
        None
    }

    fn oversized(&self, path: &Path) -> Option<u64> {
        let size = std::fs::metadata(path).ok()?.len();
        let limit = self.settings.max_file_size_mb.saturating_mul(1024 * 1024);
        (size > limit).then_some(size)
    }

    fn watch_root(&self) -> PathBuf {
        normalize_folder(&self.settings.primary_watch_dir())
    }

    fn review_folder(&self) -> PathBuf {
        self.watch_root().join(NEEDS_REVIEW_FOLDER)
    }

    /// Pick the destination folder for a classified file
    pub fn route(&self, result: &ClassificationResult) -> Route {
        let category = result.category.as_str();
        if is_unknown(category) {
            return Route {
                folder: self.review_folder(),
                source: RouteSource::NeedsReview,
            };
        }

        if let Some(route) = self.route_by_atlas(result) {
            return route;
        }

        if let Some(folder) = self.settings.category_map.get(category) {
            tracing::info!("[Processor] Category map: {} -> {}", category, folder.display());
            return Route {
                folder: folder.clone(),
                source: RouteSource::CategoryMap,
            };
        }

        self.route_by_reasoner(result)
    }

    fn route_by_atlas(&self, result: &ClassificationResult) -> Option<Route> {
        let category = result.category.as_str();
        let query = search_query(&result.keywords).unwrap_or_else(|| category.to_string());
        let threshold = self.settings.folder_match_threshold;
        let embedding = result.embedding.as_deref();

        let atlas = match self.atlas.read() {
            Ok(atlas) => atlas,
            Err(_) => {
                tracing::warn!("[Processor] Atlas lock poisoned, skipping folder match");
                return None;
            }
        };

        let (mut folder, mut score) = atlas.find_best_folder(embedding, Some(&query), threshold);
        if folder.is_none() && query != category {
            (folder, score) = atlas.find_best_folder(embedding, Some(category), threshold);
        }

        let folder = folder?;
        tracing::info!("[Processor] Atlas: route to {}", folder.display());
        Some(Route {
            folder,
            source: RouteSource::Atlas { score },
        })
    }

    fn route_by_reasoner(&self, result: &ClassificationResult) -> Route {
        let category = result.category.as_str();
        let premise = if result.keywords.is_empty() {
            result
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        } else {
            result
                .keywords
                .iter()
                .take(NLI_KEYWORD_LIMIT)
                .cloned()
                .collect::<Vec<_>>()
                .join(" ")
        };

        let resources = self.engine.resources();
        let labels = resources
            .catalog
            .read()
            .map(|catalog| catalog.names().to_vec())
            .unwrap_or_default();

        let suggestion = resources
            .nli
            .reason(&premise, &labels)
            .map(|label| sanitize_folder_name(&label))
            .filter(|label| !label.is_empty() && !is_unknown(label));

        let Some(label) = suggestion else {
            return Route {
                folder: self.watch_root().join(category),
                source: RouteSource::CategoryFolder,
            };
        };

        let existing = self.atlas.read().ok().map(|atlas| {
            atlas.find_best_folder(None, Some(&label), self.settings.nli_folder_match_threshold)
        });

        match existing {
            Some((Some(folder), score)) => {
                tracing::info!("[Processor] Reasoner suggested '{}', matched to {}", label, folder.display());
                Route {
                    folder,
                    source: RouteSource::NliMatch { label, score },
                }
            }
            _ => {
                let named = self.match_folder_name(&label, &result.keywords);
                if let Some((folder_name, folder)) = named {
                    tracing::info!(
                        "[Processor] Reasoner suggested '{}', named folder {}",
                        label,
                        folder.display()
                    );
                    return Route {
                        folder,
                        source: RouteSource::NliFolderName { label, folder_name },
                    };
                }

                let folder = self.watch_root().join(&label);
                tracing::info!("[Processor] Creating new folder '{}'", folder.display());
                Route {
                    folder,
                    source: RouteSource::NliNewFolder { label },
                }
            }
        }
    }

    /// Known folder whose name matches `label` or one of the keywords
    fn match_folder_name(&self, label: &str, keywords: &[String]) -> Option<(String, PathBuf)> {
        let atlas = self.atlas.read().ok()?;
        let names: Vec<String> = atlas.clusters().map(|c| c.name()).collect();

        let name = self
            .engine
            .resources()
            .catalog
            .read()
            .ok()?
            .find_best_candidate(label, &names, keywords)?;

        let folder = atlas.clusters().find(|c| c.name() == name)?.path.clone();
        Some((name, folder))
    }

    /// Route, move and (on success) feed the outcome back into memory, atlas
    /// and ledger
    fn place(&self, path: &Path, result: ClassificationResult) -> ProcessOutcome {
        let route = self.route(&result);

        let moved = match self.executor.move_file(path, &route.folder) {
            Ok(moved) => moved,
            Err(e) => {
                tracing::error!(path = %path.display(), "[Processor] Move failed: {}", e);
                return ProcessOutcome::Failed {
                    result,
                    route,
                    error: e.to_string(),
                };
            }
        };

        if !moved.dry_run {
            self.feedback(&result, &moved);
        }

        tracing::info!(
            "[Processor] {} placed as {} ({})",
            path.display(),
            result.category,
            result.method
        );
        ProcessOutcome::Placed {
            result,
            route,
            moved,
        }
    }

    fn feedback(&self, result: &ClassificationResult, moved: &MoveOutcome) {
        let start = Instant::now();

        if !result.is_unknown() && !result.keywords.is_empty() {
            let text = result.keywords.join(" ");
            match self.engine.resources().memory.write() {
                Ok(mut memory) => {
                    if let Err(e) = memory.learn(&text, &result.category, None) {
                        tracing::warn!("[Processor] Feedback learning failed: {}", e);
                    }
                }
                Err(_) => tracing::warn!("[Processor] Memory lock poisoned, skipping learning"),
            }
        }

        if let (Some(embedding), Some(folder)) = (&result.embedding, moved.destination.parent()) {
            match self.atlas.write() {
                Ok(mut atlas) => {
                    if let Err(e) = atlas.update_cluster(folder, embedding) {
                        tracing::warn!("[Processor] Atlas update failed: {}", e);
                    }
                }
                Err(_) => tracing::warn!("[Processor] Atlas lock poisoned, skipping update"),
            }
        }

        let mime = guess_mime(&moved.destination);
        if let Err(e) = self.ledger.record(&moved.destination, Some(&mime)) {
            tracing::warn!("[Processor] Ledger update failed: {}", e);
        }

        tracing::debug!("[Processor] Feedback took {}ms", start.elapsed().as_millis());
    }
}

/// Extension-only result for files too large for the voting engine
fn size_fallback(path: &Path) -> ClassificationResult {
    let mut result = ClassificationResult::unknown(path.to_path_buf(), ClassificationMethod::SizeFallback);
    let category = classify_by_extension(path);
    if !is_unknown(category) {
        result.category = category.to_string();
        result.confidence = SIZE_FALLBACK_CONFIDENCE;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::AtlasConfig;
    use crate::classify::{CategoryCatalog, VoterResources, VoterThresholds};
    use crate::enrich::ContentEnricher;
    use crate::memory::SemanticMemory;
    use crate::nli::{LexicalReasoner, NliReasoner};
    use crate::session::SessionTracker;
    use crate::vector::{Embedder, HashingEmbedder};
    use tempfile::{tempdir, TempDir};

    struct FixedReasoner(Option<String>);

    impl NliReasoner for FixedReasoner {
        fn reason(&self, _premise: &str, _labels: &[String]) -> Option<String> {
            self.0.clone()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct Fixture {
        dir: TempDir,
        inbox: PathBuf,
        processor: Processor,
    }

    fn fixture_with(
        configure: impl FnOnce(&mut Settings, &Path),
        nli: Arc<dyn NliReasoner>,
    ) -> Fixture {
        let dir = tempdir().unwrap();
        let inbox = dir.path().join("inbox");
        std::fs::create_dir_all(&inbox).unwrap();

        let mut settings = Settings {
            watch_directories: vec![inbox.clone()],
            scan_roots: vec![dir.path().join("library")],
            data_dir: dir.path().join("state"),
            ..Settings::default()
        };
        configure(&mut settings, dir.path());
        let settings = Arc::new(settings);

        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));
        let resources = VoterResources {
            embedder: embedder.clone(),
            catalog: Arc::new(RwLock::new(CategoryCatalog::new(embedder.clone()))),
            memory: Arc::new(RwLock::new(SemanticMemory::in_memory(embedder.clone(), 20))),
            session: Arc::new(SessionTracker::new(5)),
            nli,
            thresholds: VoterThresholds::default(),
        };
        let engine = VotingEngine::new(Arc::new(resources), Arc::new(ContentEnricher::new()));

        let mut atlas = Atlas::in_memory(embedder, AtlasConfig::default());
        atlas
            .build_index(
                &settings.scan_roots,
                &ContentEnricher::new(),
                &|_| {},
                &CancellationToken::new(),
            )
            .unwrap();

        let executor =
            TransactionalExecutor::open(settings.transactions_path(), settings.dry_run).unwrap();
        let ledger = FileLedger::open(settings.ledger_path()).unwrap();
        let guard = ResourceGuard::new(0, 0)
            .with_probe_paths(dir.path().join("no-meminfo"), dir.path().join("no-power"));

        let processor = Processor::new(
            settings,
            Arc::new(engine),
            Arc::new(RwLock::new(atlas)),
            Arc::new(executor),
            Arc::new(ledger),
        )
        .with_resource_guard(guard);

        Fixture {
            dir,
            inbox,
            processor,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|_, _| {}, Arc::new(LexicalReasoner::default()))
    }

    fn drop_file(fx: &Fixture, name: &str, content: &[u8]) -> PathBuf {
        let path = fx.inbox.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_sanitize_folder_name() {
        assert_eq!(sanitize_folder_name(" /Tax/Returns\\ "), "Tax_Returns");
        assert_eq!(sanitize_folder_name("Hackathon"), "Hackathon");
    }

    #[tokio::test]
    async fn test_unknown_goes_to_needs_review() {
        let fx = fixture();
        let path = drop_file(&fx, "blob.bin", &[0u8, 1, 2, 3]);

        let outcome = fx.processor.process_one(&path).await;
        let ProcessOutcome::Placed { route, moved, result } = outcome else {
            panic!("expected placement, got {:?}", outcome);
        };

        assert!(result.is_unknown());
        assert_eq!(route.source, RouteSource::NeedsReview);
        assert_eq!(
            moved.destination,
            fx.inbox.canonicalize().unwrap().join(NEEDS_REVIEW_FOLDER).join("blob.bin")
        );
        assert!(moved.destination.exists());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_category_map_wins_without_atlas_match() {
        let fx = fixture_with(
            |settings, root| {
                settings
                    .category_map
                    .insert("Audio".to_string(), root.join("Music"));
            },
            Arc::new(LexicalReasoner::default()),
        );
        let path = drop_file(&fx, "song.mp3", &[0xffu8, 0xfb, 0x90, 0x00]);

        let ProcessOutcome::Placed { route, moved, .. } = fx.processor.process_one(&path).await else {
            panic!("expected placement");
        };
        assert_eq!(route.source, RouteSource::CategoryMap);
        assert_eq!(moved.destination, fx.dir.path().join("Music").join("song.mp3"));
    }

    #[tokio::test]
    async fn test_atlas_folder_match() {
        let fx = fixture_with(
            |_, root| {
                std::fs::create_dir_all(root.join("library").join("Audio")).unwrap();
            },
            Arc::new(LexicalReasoner::default()),
        );
        let path = drop_file(&fx, "song.mp3", &[0xffu8, 0xfb, 0x90, 0x00]);

        let ProcessOutcome::Placed { route, moved, .. } = fx.processor.process_one(&path).await else {
            panic!("expected placement");
        };
        assert!(matches!(route.source, RouteSource::Atlas { score } if score >= 0.55));
        let audio = fx.dir.path().join("library").join("Audio").canonicalize().unwrap();
        assert_eq!(moved.destination, audio.join("song.mp3"));
    }

    #[tokio::test]
    async fn test_reasoner_abstains_uses_category_folder() {
        let fx = fixture_with(|_, _| {}, Arc::new(FixedReasoner(None)));
        let path = drop_file(&fx, "song.mp3", &[0xffu8, 0xfb, 0x90, 0x00]);

        let ProcessOutcome::Placed { route, moved, .. } = fx.processor.process_one(&path).await else {
            panic!("expected placement");
        };
        assert_eq!(route.source, RouteSource::CategoryFolder);
        assert_eq!(
            moved.destination,
            fx.inbox.canonicalize().unwrap().join("Audio").join("song.mp3")
        );
    }

    #[tokio::test]
    async fn test_reasoner_label_creates_folder() {
        let fx = fixture_with(|_, _| {}, Arc::new(FixedReasoner(Some("Podcasts/2024".into()))));
        let path = drop_file(&fx, "song.mp3", &[0xffu8, 0xfb, 0x90, 0x00]);

        let ProcessOutcome::Placed { route, moved, .. } = fx.processor.process_one(&path).await else {
            panic!("expected placement");
        };
        assert_eq!(
            route.source,
            RouteSource::NliNewFolder {
                label: "Podcasts_2024".to_string()
            }
        );
        assert!(moved.destination.ends_with("Podcasts_2024/song.mp3"));
        assert!(moved.destination.exists());
    }

    #[tokio::test]
    async fn test_reasoner_label_matches_folder_name() {
        let fx = fixture_with(
            |settings, root| {
                std::fs::create_dir_all(root.join("library").join("Podcasts")).unwrap();
                settings.nli_folder_match_threshold = 1.5;
            },
            Arc::new(FixedReasoner(Some("podcasts".into()))),
        );
        let path = drop_file(&fx, "song.mp3", &[0xffu8, 0xfb, 0x90, 0x00]);

        let ProcessOutcome::Placed { route, moved, .. } = fx.processor.process_one(&path).await else {
            panic!("expected placement");
        };
        assert_eq!(
            route.source,
            RouteSource::NliFolderName {
                label: "podcasts".to_string(),
                folder_name: "Podcasts".to_string(),
            }
        );
        let podcasts = fx.dir.path().join("library").join("Podcasts").canonicalize().unwrap();
        assert_eq!(moved.destination, podcasts.join("song.mp3"));
    }

    #[tokio::test]
    async fn test_size_fallback() {
        let fx = fixture_with(
            |settings, _| settings.max_file_size_mb = 0,
            Arc::new(FixedReasoner(None)),
        );
        let path = drop_file(&fx, "holiday.jpg", b"not really a jpeg");

        let ProcessOutcome::Placed { result, moved, .. } = fx.processor.process_one(&path).await else {
            panic!("expected placement");
        };
        assert_eq!(result.method, ClassificationMethod::SizeFallback);
        assert_eq!(result.category, "Images");
        assert!(result.votes.is_empty());
        assert!(moved.destination.ends_with("Images/holiday.jpg"));
    }

    #[tokio::test]
    async fn test_skips() {
        let fx = fixture();

        let missing = fx.inbox.join("gone.pdf");
        assert!(matches!(
            fx.processor.process_one(&missing).await,
            ProcessOutcome::Skipped { reason: SkipReason::Missing, .. }
        ));

        let partial = drop_file(&fx, "movie.mp4.part", b"partial");
        assert!(matches!(
            fx.processor.process_one(&partial).await,
            ProcessOutcome::Skipped { reason: SkipReason::Ignored, .. }
        ));

        let song = drop_file(&fx, "song.mp3", &[0xffu8, 0xfb]);
        let ProcessOutcome::Placed { moved, .. } = fx.processor.process_one(&song).await else {
            panic!("expected placement");
        };
        assert!(matches!(
            fx.processor.process_one(&moved.destination).await,
            ProcessOutcome::Skipped { reason: SkipReason::RecentlyMoved, .. }
        ));
    }

    #[tokio::test]
    async fn test_dry_run_leaves_file_in_place() {
        let fx = fixture_with(
            |settings, _| settings.dry_run = true,
            Arc::new(FixedReasoner(None)),
        );
        let path = drop_file(&fx, "song.mp3", &[0xffu8, 0xfb]);

        let ProcessOutcome::Placed { moved, .. } = fx.processor.process_one(&path).await else {
            panic!("expected placement");
        };
        assert!(moved.dry_run);
        assert!(path.exists());
        assert!(!moved.destination.exists());
        assert_eq!(fx.processor.ledger.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_feedback_records_ledger() {
        let fx = fixture_with(|_, _| {}, Arc::new(FixedReasoner(None)));
        let path = drop_file(&fx, "song.mp3", &[0xffu8, 0xfb, 0x90, 0x00]);

        let ProcessOutcome::Placed { moved, .. } = fx.processor.process_one(&path).await else {
            panic!("expected placement");
        };
        let entry = fx.processor.ledger.lookup_file(&moved.destination).unwrap().unwrap();
        assert_eq!(entry.current_path, moved.destination);
        assert_eq!(entry.mime_type.as_deref(), Some("audio/mpeg"));
    }

    #[tokio::test]
    async fn test_run_loop_consumes_queue() {
        let fx = fixture_with(|_, _| {}, Arc::new(FixedReasoner(None)));
        let path = drop_file(&fx, "song.mp3", &[0xffu8, 0xfb, 0x90, 0x00]);
        let expected = fx.inbox.canonicalize().unwrap().join("Audio").join("song.mp3");

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let processor = fx.processor.clone();
        let task = tokio::spawn(processor.run(rx));

        tx.send(path.clone()).await.unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while !expected.exists() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(expected.exists());

        fx.processor.stop();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
