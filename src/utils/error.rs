//! Error types and handling
//!
//! Common error types used across the crate. Each subsystem keeps its own
//! error enum; this one aggregates them for callers that drive several.

use crate::clips::types::{CutError, ManifestError, SplitError};
use crate::recorder::writer::SessionError;
use crate::storage::store::StoreError;
use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Clip cut error: {0}")]
    Cut(#[from] CutError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Split error: {0}")]
    Split(#[from] SplitError),

    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias using TelemetryError
pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsystem_errors_convert() {
        fn load() -> TelemetryResult<()> {
            let _: serde_json::Value = serde_json::from_str("{broken")?;
            Ok(())
        }
        assert!(matches!(load(), Err(TelemetryError::Serialization(_))));

        let err: TelemetryError = StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "counters.json",
        ))
        .into();
        assert!(matches!(err, TelemetryError::Store(_)));
        assert!(err.to_string().contains("counters.json"));

        let err = TelemetryError::Config("bufferCount must be at least 1".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: bufferCount must be at least 1");
    }
}
