//! Classification commands

use super::{AppState, CommandError};
use crate::models::ClassificationResult;
use crate::services::ProcessOutcome;
use std::path::Path;

/// Classify a file without moving it
pub async fn classify_file(state: &AppState, path: &Path) -> Result<ClassificationResult, CommandError> {
    if !path.is_file() {
        return Err(CommandError::NotAFile(path.to_path_buf()));
    }
    Ok(state.engine.process(path).await)
}

/// Classify, route and place a single file, as the watcher pipeline would
pub async fn process_file(state: &AppState, path: &Path) -> Result<ProcessOutcome, CommandError> {
    if !path.is_file() {
        return Err(CommandError::NotAFile(path.to_path_buf()));
    }
    Ok(state.processor().process_one(path).await)
}
