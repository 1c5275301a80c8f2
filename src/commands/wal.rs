//! Transaction commands: manual moves, undo and crash recovery

use super::{AppState, CommandError};
use crate::execution::MoveOutcome;
use crate::wal::{RecoveryReport, TransactionRecord};
use std::path::Path;

/// Move a file into `dest_folder` through the transaction log
pub fn move_file(state: &AppState, source: &Path, dest_folder: &Path) -> Result<MoveOutcome, CommandError> {
    Ok(state.executor.move_file(source, dest_folder)?)
}

/// Reverse the most recent committed move
pub fn undo_last(state: &AppState) -> Result<TransactionRecord, CommandError> {
    Ok(state.executor.try_undo_last()?)
}

/// Reconcile records left `pending` by an interrupted run
///
/// Should run on startup before the watcher is started.
pub fn recover(state: &AppState) -> Result<RecoveryReport, CommandError> {
    let pending = state.executor.pending();
    if !pending.is_empty() {
        tracing::info!("Found {} interrupted transactions", pending.len());
    }
    Ok(state.executor.recover()?)
}

/// Every logged transaction, oldest first
pub fn history(state: &AppState) -> Vec<TransactionRecord> {
    state.executor.history()
}
