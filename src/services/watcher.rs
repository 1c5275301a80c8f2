//! Watch directories for new files and feed them to the processor queue

use crate::config::Settings;
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Time a file must be quiet before it is reported
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    Create(#[source] notify::Error),

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Watcher state lock poisoned")]
    Poisoned,
}

/// Watcher state
#[derive(Default)]
pub struct WatcherState {
    pub watcher: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
    pub watching_paths: Vec<PathBuf>,
    pub enabled: bool,
}

/// Shared watcher state
pub type WatcherHandle = Arc<Mutex<WatcherState>>;

/// Create a new watcher handle
pub fn create_watcher_handle() -> WatcherHandle {
    Arc::new(Mutex::new(WatcherState::default()))
}

/// Start watching `paths`, forwarding accepted new files into `queue`.
///
/// A watcher already running on the handle is replaced.
pub fn start_watcher(
    handle: &WatcherHandle,
    paths: &[PathBuf],
    settings: Arc<Settings>,
    queue: mpsc::Sender<PathBuf>,
) -> Result<(), WatcherError> {
    let mut state = handle.lock().map_err(|_| WatcherError::Poisoned)?;
    state.watcher = None;

    // Waits 500ms for file writes to complete
    let mut debouncer = new_debouncer(
        DEBOUNCE_DELAY,
        None,
        move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
            Ok(events) => {
                for event in events {
                    handle_file_event(&event, &settings, &queue);
                }
            }
            Err(errors) => {
                for error in errors {
                    tracing::warn!("[Watcher] {:?}", error);
                }
            }
        },
    )
    .map_err(WatcherError::Create)?;

    for path in paths {
        if let Err(e) = std::fs::create_dir_all(path) {
            tracing::warn!(path = %path.display(), "[Watcher] Could not create watch directory: {}", e);
        }
        debouncer
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| WatcherError::Watch {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), "[Watcher] Watching");
    }

    state.watcher = Some(debouncer);
    state.watching_paths = paths.to_vec();
    state.enabled = true;

    Ok(())
}

/// Stop watching
pub fn stop_watcher(handle: &WatcherHandle) -> Result<(), WatcherError> {
    let mut state = handle.lock().map_err(|_| WatcherError::Poisoned)?;
    state.watcher = None;
    state.watching_paths.clear();
    state.enabled = false;
    Ok(())
}

/// Check if watcher is running
pub fn is_watcher_running(handle: &WatcherHandle) -> bool {
    handle
        .lock()
        .map(|state| state.enabled && state.watcher.is_some())
        .unwrap_or(false)
}

/// Directories currently watched
pub fn get_watching_paths(handle: &WatcherHandle) -> Vec<PathBuf> {
    handle
        .lock()
        .map(|state| state.watching_paths.clone())
        .unwrap_or_default()
}

/// Whether a path should be handed to the processor: an existing, non-empty,
/// non-hidden file whose name matches no ignore pattern.
pub fn accepts(path: &Path, settings: &Settings) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if metadata.is_dir() {
        return false;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if file_name.is_empty() || file_name.starts_with('.') || settings.is_ignored(&file_name) {
        return false;
    }

    // Still being written
    metadata.len() > 0
}

fn handle_file_event(event: &DebouncedEvent, settings: &Settings, queue: &mpsc::Sender<PathBuf>) {
    // Only handle create events for new files
    if !matches!(event.kind, EventKind::Create(_)) {
        return;
    }

    for path in &event.paths {
        if !accepts(path, settings) {
            continue;
        }

        tracing::debug!(path = %path.display(), "[Watcher] New file");
        if queue.blocking_send(path.clone()).is_err() {
            tracing::warn!("[Watcher] Processor queue closed, dropping {}", path.display());
            return;
        }
    }
}
