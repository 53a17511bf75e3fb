use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};

/// Smallest ceiling accepted by [`ChunkerConfig::validate`].
pub const MIN_CHUNK_BYTES: usize = 64;

/// Configuration for code chunking behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Hard ceiling for the primary bytes of one chunk
    pub max_chunk_bytes: usize,

    /// Trailing context carried from one sub-chunk into the next
    pub overlap_bytes: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: 8_000,
            overlap_bytes: 200,
        }
    }
}

impl ChunkerConfig {
    /// Create config with an explicit ceiling and overlap
    #[must_use]
    pub const fn new(max_chunk_bytes: usize, overlap_bytes: usize) -> Self {
        Self {
            max_chunk_bytes,
            overlap_bytes,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_bytes < MIN_CHUNK_BYTES {
            return Err(ChunkerError::invalid_config(format!(
                "max_chunk_bytes must be at least {MIN_CHUNK_BYTES}, got {}",
                self.max_chunk_bytes
            )));
        }
        if self.overlap_bytes >= self.max_chunk_bytes {
            return Err(ChunkerError::invalid_config(format!(
                "overlap_bytes ({}) must be smaller than max_chunk_bytes ({})",
                self.overlap_bytes, self.max_chunk_bytes
            )));
        }
        Ok(())
    }

    /// Stable string identifying settings that change chunk output.
    ///
    /// Persisted chunk sets are keyed by it so a config change forces re-chunking.
    #[must_use]
    pub fn signature(&self) -> String {
        format!(
            "v1;max={};overlap={}",
            self.max_chunk_bytes, self.overlap_bytes
        )
    }
}
