//! Atlas commands
//!
//! Scans build a fresh index off to the side on a blocking task and swap it
//! in at the end, so classification keeps using the previous index while a
//! scan runs.

use super::{AppState, CommandError};
use crate::atlas::{Atlas, AtlasConfig, ScanProgress, ScanSummary};
use crate::utils::CancellationToken;
use std::path::PathBuf;

/// Scan `roots` (the configured scan roots when empty) and replace the
/// shared atlas with the result.
pub async fn build_atlas<F>(
    state: &AppState,
    roots: Vec<PathBuf>,
    progress: F,
    cancel: CancellationToken,
) -> Result<ScanSummary, CommandError>
where
    F: Fn(ScanProgress) + Send + 'static,
{
    let roots = if roots.is_empty() {
        state.settings.scan_roots.clone()
    } else {
        roots
    };

    let settings = state.settings.clone();
    let embedder = state.embedder.clone();
    let enricher = state.enricher.clone();

    let (atlas, summary) = tokio::task::spawn_blocking(move || -> Result<_, CommandError> {
        let config = AtlasConfig {
            max_depth: settings.atlas_max_depth,
            ..AtlasConfig::default()
        };
        let mut atlas = Atlas::new(settings.atlas_index_path(), embedder, config);
        atlas.load()?;
        let summary = atlas.build_index(&roots, enricher.as_ref(), &progress, &cancel)?;
        Ok((atlas, summary))
    })
    .await
    .map_err(|e| CommandError::Task(e.to_string()))??;

    let folder_names: Vec<String> = atlas.clusters().map(|c| c.name()).collect();
    *state.atlas.write().map_err(|_| CommandError::Poisoned("atlas"))? = atlas;

    let added = state
        .engine
        .resources()
        .catalog
        .write()
        .map_err(|_| CommandError::Poisoned("catalog"))?
        .add_dynamic_categories(folder_names.iter().map(String::as_str));
    tracing::info!(
        folders = summary.folders_discovered,
        categories_added = added,
        "[Atlas] Index ready in {}ms",
        summary.elapsed_ms
    );

    Ok(summary)
}

/// Build the atlas from the configured scan roots if none is loaded yet
pub async fn initialize_atlas(
    state: &AppState,
    cancel: CancellationToken,
) -> Result<Option<ScanSummary>, CommandError> {
    let empty = state
        .atlas
        .read()
        .map_err(|_| CommandError::Poisoned("atlas"))?
        .is_empty();
    if !empty {
        return Ok(None);
    }

    let summary = build_atlas(state, Vec::new(), |_| {}, cancel).await?;
    Ok(Some(summary))
}
