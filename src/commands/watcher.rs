use super::{AppState, CommandError};
use crate::services::watcher::{self, get_watching_paths, is_watcher_running};
use crate::services::{Processor, QUEUE_CAPACITY};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Watcher status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStatus {
    pub enabled: bool,
    pub watching_paths: Vec<PathBuf>,
}

/// A running watcher + processor pair
pub struct WatchSession {
    pub processor: Processor,
    pub task: JoinHandle<()>,
}

/// Start the watcher over the configured watch directories and spawn the
/// processor consuming its queue
pub fn start_watching(state: &AppState) -> Result<WatchSession, CommandError> {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

    watcher::start_watcher(
        &state.watcher,
        &state.settings.watch_directories,
        state.settings.clone(),
        tx,
    )?;

    let processor = state.processor();
    let task = tokio::spawn(processor.clone().run(rx));
    Ok(WatchSession { processor, task })
}

/// Stop the watcher, let the processor finish its current file and wait for it
pub async fn stop_watching(state: &AppState, session: WatchSession) -> Result<(), CommandError> {
    watcher::stop_watcher(&state.watcher)?;
    session.processor.stop();
    session
        .task
        .await
        .map_err(|e| CommandError::Task(e.to_string()))
}

/// Get watcher status
pub fn watcher_status(state: &AppState) -> WatcherStatus {
    WatcherStatus {
        enabled: is_watcher_running(&state.watcher),
        watching_paths: get_watching_paths(&state.watcher),
    }
}
