use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced to callers of the engine.
///
/// Everything else (unreadable files, parse failures, cache storage errors,
/// a corrupt manifest) is absorbed and only visible through stats and logs.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid repository root {}: {reason}", .path.display())]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Token budget {budget} is below the smallest candidate chunk ({required} tokens)")]
    BudgetTooSmall { budget: usize, required: usize },

    #[error("Indexer error: {0}")]
    Indexer(#[from] context_indexer::IndexerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
