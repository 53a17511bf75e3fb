use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_MAX_DISK_BYTES: u64 = 64 * 1024 * 1024;
const DEFAULT_MAX_MEMORY_BYTES: u64 = 16 * 1024 * 1024;
const DEFAULT_IO_TIMEOUT_MS: u64 = 3_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Entry lifetime from creation
    pub ttl_secs: u64,
    /// Disk tier ceiling; least recently used entries are pruned past it
    pub max_disk_bytes: u64,
    /// Memory tier ceiling, measured in serialized bytes
    pub max_memory_bytes: u64,
    /// Per-operation bound on disk reads and writes; set by the owner
    #[serde(skip)]
    pub io_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_TTL_SECS,
            max_disk_bytes: DEFAULT_MAX_DISK_BYTES,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_secs == 0 {
            return Err("cache.ttl_secs must be positive".to_string());
        }
        if self.io_timeout_ms == 0 {
            return Err("cache io_timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}
