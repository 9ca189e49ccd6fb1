//! Flow file ingestion
//!
//! This module covers everything between a file on disk and a numeric
//! feature matrix: stability detection for files that are still being
//! appended to, raw CSV reading, header canonicalisation and row cleaning,
//! plus an optional filesystem-event trigger.

mod normalizer;
mod stability;
mod table;
mod watcher;


pub use normalizer::{
    aliases_of, canonical_name, collapse_whitespace, ExpectedSchema, NormalizedBatch,
    Normalization, RowNormalizer, DEFAULT_FEATURES, DROP_COLUMNS, LABEL_COLUMN, SYNONYMS,
};
pub use stability::{StabilityConfig, StabilityGate};
pub use table::RawTable;
pub use watcher::{DirectoryWatcher, WatcherHandle};

use std::path::{Path, PathBuf};

/// Case-insensitive extension check (`csv` matches `a.csv` and `A.CSV`)
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Regular files in `dir` (non-recursive) with the given extension, sorted
/// lexically so every tick visits them in the same order.
pub async fn list_flow_files(dir: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !has_extension(&path, extension) {
            continue;
        }
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => files.push(path),
            _ => {}
        }
    }

    files.sort();
    Ok(files)
}
