use std::io;
use std::path::{Path, PathBuf};

use harvest_core::models::Checkpoint;
use harvest_core::traits::ProgressStore;
use harvest_core::AppError;

use crate::record_sink::write_json_atomic;

/// Checkpoint kept in a single JSON file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonProgressStore {
    path: PathBuf,
}

impl JsonProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), AppError> {
        let path = self.path.clone();
        let checkpoint = checkpoint.clone();
        tokio::task::spawn_blocking(move || write_json_atomic(&path, &checkpoint))
            .await
            .map_err(|e| AppError::Generic(format!("checkpoint task failed: {e}")))?
    }

    /// The saved checkpoint, if any.
    ///
    /// A checkpoint that cannot be parsed is treated as absent so that a
    /// damaged file never blocks a fresh start.
    pub async fn load(&self) -> Result<Option<Checkpoint>, AppError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::Generic(format!(
                    "Failed to read checkpoint {}: {e}",
                    self.path.display()
                )));
            }
        };
        match serde_json::from_slice::<Checkpoint>(&bytes) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring unreadable checkpoint"
                );
                Ok(None)
            }
        }
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Generic(format!(
                "Failed to clear checkpoint {}: {e}",
                self.path.display()
            ))),
        }
    }
}

// -- Trait implementation --

impl ProgressStore for JsonProgressStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), AppError> {
        self.save(checkpoint).await
    }

    async fn load(&self) -> Result<Option<Checkpoint>, AppError> {
        self.load().await
    }

    async fn clear(&self) -> Result<(), AppError> {
        self.clear().await
    }
}
