use std::path::{Path, PathBuf};

use harvest_core::AppError;
use harvest_core::util::query_slug;

use crate::config::OutputConfig;
use crate::progress_store::JsonProgressStore;
use crate::record_sink::CsvRecordSink;

/// File locations for one query.
///
/// ```text
/// <root>/csv/<slug>.csv
/// <root>/json/<slug>.json
/// <root>/logs/<slug>_progress.json
/// ```
#[derive(Debug, Clone)]
pub struct OutputLayout {
    slug: String,
    rows: PathBuf,
    snapshot: PathBuf,
    checkpoint: PathBuf,
}

impl OutputLayout {
    pub fn for_query(config: &OutputConfig, query: &str) -> Self {
        let slug = query_slug(query);
        let root = &config.root;
        Self {
            rows: root.join("csv").join(format!("{slug}.csv")),
            snapshot: root.join("json").join(format!("{slug}.json")),
            checkpoint: root.join("logs").join(format!("{slug}_progress.json")),
            slug,
        }
    }

    /// Create the output directories if missing.
    pub async fn ensure_dirs(&self) -> Result<(), AppError> {
        for path in [&self.rows, &self.snapshot, &self.checkpoint] {
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir).await.map_err(|e| {
                    AppError::SetupError(format!("cannot create {}: {e}", dir.display()))
                })?;
            }
        }
        Ok(())
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn rows_path(&self) -> &Path {
        &self.rows
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint
    }

    /// Get a [`CsvRecordSink`] over this layout's row store and snapshot.
    pub fn record_sink(&self) -> CsvRecordSink {
        CsvRecordSink::new(&self.rows, &self.snapshot)
    }

    /// Get a [`JsonProgressStore`] over this layout's checkpoint file.
    pub fn progress_store(&self) -> JsonProgressStore {
        JsonProgressStore::new(&self.checkpoint)
    }
}
