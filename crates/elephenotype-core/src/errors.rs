//! Error types for the Elephenotype core library.
//!
//! Per-item variants (`SyntaxParse`, `EntityExtraction`, `PayloadParse`) are
//! built at the item boundary, logged, and dropped. Only repository/directory
//! lookups and configuration errors are returned to the caller.

use std::path::PathBuf;

/// Top-level error enum for the Elephenotype core library.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Repository path does not exist: {}", .0.display())]
    RepositoryNotFound(PathBuf),

    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Syntax error in {path}: {reason}")]
    SyntaxParse { path: String, reason: String },

    #[error("Failed to extract {entity} from {path}: {reason}")]
    EntityExtraction {
        path: String,
        entity: String,
        reason: String,
    },

    #[error("Failed to parse payload for {custom_id}: {reason}")]
    PayloadParse { custom_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// True for errors that must stop the whole run rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::DirectoryNotFound(_) | CoreError::Configuration(_)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_is_fatal() {
        assert!(CoreError::Configuration("bad ratio".into()).is_fatal());
        assert!(CoreError::DirectoryNotFound(PathBuf::from("/missing")).is_fatal());
    }

    #[test]
    fn test_per_item_errors_are_not_fatal() {
        let err = CoreError::PayloadParse {
            custom_id: "scenario1_x".into(),
            reason: "eof".into(),
        };
        assert!(!err.is_fatal());
        assert!(!CoreError::RepositoryNotFound(PathBuf::from("/r")).is_fatal());
    }

    #[test]
    fn test_display_includes_context() {
        let err = CoreError::SyntaxParse {
            path: "pkg/mod.py".into(),
            reason: "error node at line 3".into(),
        };
        assert_eq!(
            err.to_string(),
            "Syntax error in pkg/mod.py: error node at line 3"
        );
    }
}
