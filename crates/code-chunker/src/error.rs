use crate::language::Language;
use thiserror::Error;

/// Result type for chunker operations
pub type Result<T> = std::result::Result<T, ChunkerError>;

/// Errors that can occur while configuring or running the chunker
#[derive(Error, Debug)]
pub enum ChunkerError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The grammar could not be loaded or the content did not parse cleanly
    #[error("Tree-sitter error: {0}")]
    TreeSitterError(String),
}

impl ChunkerError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a tree-sitter error
    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitterError(msg.into())
    }
}

/// A file could not be split along syntactic boundaries.
///
/// This is an outcome, not a hard error: the chunker still returns generic
/// chunks for the file and reports the failure alongside them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{language} parse failure in {file_path}: {reason}")]
pub struct ParseFailure {
    pub file_path: String,
    pub language: Language,
    pub reason: String,
}

impl ParseFailure {
    pub fn new(
        file_path: impl Into<String>,
        language: Language,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            language,
            reason: reason.into(),
        }
    }
}
