use thiserror::Error;

/// Application-wide error types for Harvest.
#[derive(Error, Debug)]
pub enum AppError {
    /// A collaborator (page source, sink, progress store) is unreachable
    /// before any work started.
    #[error("Setup error: {0}")]
    SetupError(String),

    /// Persisting a record or snapshot failed.
    #[error("Sink error: {0}")]
    SinkError(String),

    /// Moving to another result page failed.
    #[error("Navigation error: {0}")]
    NavigationError(String),

    /// HTTP request failed (fetching a page).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error aborts a whole session on its own.
    ///
    /// Sink errors only become fatal once the retry budget is spent, which
    /// the session controller tracks separately.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::SetupError(_) | AppError::ConfigError(_))
    }

    /// Returns true if this error is likely to go away on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) => true,
            AppError::HttpError(msg) | AppError::NavigationError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}

/// Failure to turn one item handle into a record.
///
/// Kept apart from [`AppError`] so a per-item failure cannot be bubbled
/// into a session abort with `?`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The item carries no identity.
    #[error("item has no identity")]
    MissingIdentity,

    /// The item rendered without any readable field.
    #[error("item {0} has no readable fields")]
    EmptyListing(String),

    /// The item markup could not be interpreted.
    #[error("malformed item: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(AppError::SetupError("no browser".into()).is_fatal());
        assert!(AppError::ConfigError("bad range".into()).is_fatal());
        assert!(!AppError::SinkError("disk full".into()).is_fatal());
        assert!(!AppError::NavigationError("no next".into()).is_fatal());
    }

    #[test]
    fn test_transient_errors() {
        assert!(AppError::Timeout(15).is_transient());
        assert!(AppError::NetworkError("reset".into()).is_transient());
        assert!(AppError::NavigationError("timeout waiting for results".into()).is_transient());
        assert!(!AppError::NavigationError("next button missing".into()).is_transient());
        assert!(!AppError::SinkError("permission denied".into()).is_transient());
    }

    #[test]
    fn test_extract_error_display() {
        assert_eq!(
            ExtractError::EmptyListing("B0ABC".into()).to_string(),
            "item B0ABC has no readable fields"
        );
    }
}
