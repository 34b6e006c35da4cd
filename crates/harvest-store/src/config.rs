use std::path::PathBuf;

use harvest_core::AppError;

/// Default root for all session output.
pub const DEFAULT_OUTPUT_DIR: &str = "output_files";

/// Where session files are written.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub root: PathBuf,
}

impl OutputConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Read configuration from environment variables.
    ///
    /// - `HARVEST_OUTPUT_DIR` (optional, defaults to `output_files`)
    pub fn from_env() -> Result<Self, AppError> {
        match std::env::var("HARVEST_OUTPUT_DIR") {
            Err(_) => Ok(Self::default()),
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(AppError::ConfigError(
                        "HARVEST_OUTPUT_DIR is set but empty".into(),
                    ));
                }
                Ok(Self::new(trimmed))
            }
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}
