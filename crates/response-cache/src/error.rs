use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Storage failures inside the cache. Never surfaced to callers of
/// [`crate::ResponseCache`]; they are logged, counted and treated as misses.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache {op} timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },

    #[error("Cache worker failed: {0}")]
    Worker(String),
}
