use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

/// Errors produced by the retrieval and generation pipeline.
///
/// The grounding refusal is not an error: a query with no evidence yields a
/// valid [`crate::models::Answer`] with `grounded == false`.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Embedding capability failed: {0}")]
    EncodingFailure(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index is stale (index generation {index}, store generation {store})")]
    IndexStale { index: u64, store: u64 },

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("Generation capability failed: {0}")]
    GenerationFailure(String),

    #[error("Keyword index error: {0}")]
    KeywordIndex(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Transient failures the service layer may surface as "try again".
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RagError::IndexStale { .. }
                | RagError::Timeout { .. }
                | RagError::GenerationFailure(_)
                | RagError::EncodingFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RagError::IndexStale { index: 1, store: 2 }.is_transient());
        assert!(RagError::Timeout {
            stage: "generation",
            after: Duration::from_secs(1)
        }
        .is_transient());
        assert!(!RagError::InvalidRecord("dup".into()).is_transient());
        assert!(!RagError::DimensionMismatch {
            expected: 3,
            actual: 4
        }
        .is_transient());
    }

    #[test]
    fn test_display_includes_dimensions() {
        let err = RagError::DimensionMismatch {
            expected: 768,
            actual: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Vector dimension mismatch: expected 768, got 1024"
        );
    }
}
