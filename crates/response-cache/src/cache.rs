use crate::config::CacheConfig;
use crate::disk::{CacheEnvelope, DiskTier};
use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::memory::{Lookup, MemoryEntry, MemoryTier};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" in unix milliseconds
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Counter snapshot for stats reporting
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Storage failures absorbed as misses or skipped writes
    pub errors: u64,
    pub evictions: u64,
    pub memory_entries: usize,
    pub memory_bytes: u64,
    /// Bytes held by the disk tier
    pub disk_bytes: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    evictions: AtomicU64,
}

/// Advisory two-tier cache of query responses.
///
/// Memory LRU in front of a sharded disk directory, both bounded in bytes,
/// with a TTL from creation. Storage failures never reach the caller: a
/// failing read is a miss, a failing write is skipped.
pub struct ResponseCache<T> {
    config: CacheConfig,
    memory: Mutex<MemoryTier<T>>,
    disk: Option<DiskTier>,
    disk_bytes: AtomicU64,
    counters: Counters,
    clock: Clock,
}

impl<T> std::fmt::Debug for ResponseCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("config", &self.config)
            .field("disk", &self.disk)
            .finish_non_exhaustive()
    }
}

impl<T> ResponseCache<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    /// Open the cache rooted at `dir`. A directory that cannot be created
    /// leaves the cache memory-only.
    pub async fn open(dir: impl Into<PathBuf>, config: CacheConfig) -> Self {
        Self::open_with_clock(dir, config, Arc::new(unix_now_ms)).await
    }

    pub async fn open_with_clock(
        dir: impl Into<PathBuf>,
        config: CacheConfig,
        clock: Clock,
    ) -> Self {
        let counters = Counters::default();
        let disk = if config.enabled {
            match DiskTier::open(dir.into(), config.io_timeout()).await {
                Ok(disk) => Some(disk),
                Err(err) => {
                    log::warn!("Response cache disk tier unavailable, memory only: {err}");
                    counters.errors.fetch_add(1, Ordering::Relaxed);
                    None
                }
            }
        } else {
            None
        };

        let mut disk_bytes = 0;
        if let Some(disk) = &disk {
            match disk.purge_expired(clock()).await {
                Ok(0) => {}
                Ok(purged) => log::debug!("Purged {purged} expired cache entries"),
                Err(err) => log::warn!("Failed to purge expired cache entries: {err}"),
            }
            disk_bytes = disk.usage().await.unwrap_or(0);
        }

        Self {
            memory: Mutex::new(MemoryTier::new(config.max_memory_bytes)),
            config,
            disk,
            disk_bytes: AtomicU64::new(disk_bytes),
            counters,
            clock,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn key(query: &str, chunk_fingerprints: &[context_protocol::Fingerprint]) -> CacheKey {
        CacheKey::new(query, chunk_fingerprints)
    }

    /// Live value for `key`, from memory or disk
    pub async fn get(&self, key: &CacheKey) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        let now = (self.clock)();

        let lookup = self.memory().get(key, now);
        match lookup {
            Lookup::Hit(data) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("Response cache hit {key} (memory)");
                return Some(data);
            }
            Lookup::Expired => {
                self.remove_from_disk(key).await;
                return self.miss();
            }
            Lookup::Missing => {}
        }

        let Some(disk) = &self.disk else {
            return self.miss();
        };
        let envelope: CacheEnvelope<T> = match disk.read(key).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return self.miss(),
            Err(err) => {
                self.record_error("read", &err);
                return self.miss();
            }
        };
        if envelope.expires_at_ms <= now {
            self.remove_from_disk(key).await;
            return self.miss();
        }

        if let Err(err) = disk.touch(key).await {
            log::debug!("Failed to refresh cache entry {key}: {err}");
        }
        let size_bytes = serde_json::to_vec(&envelope.data).map_or(0, |bytes| bytes.len() as u64);
        let evicted = self.memory().insert(
            *key,
            MemoryEntry {
                data: envelope.data.clone(),
                expires_at_ms: envelope.expires_at_ms,
                size_bytes,
            },
        );
        self.counters.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        log::debug!("Response cache hit {key} (disk)");
        Some(envelope.data)
    }

    /// Store `value` under `key`; last writer wins
    pub async fn put(&self, key: &CacheKey, value: &T) {
        if !self.config.enabled {
            return;
        }
        let now = (self.clock)();
        let envelope = CacheEnvelope {
            created_at_ms: now,
            expires_at_ms: now.saturating_add(self.config.ttl_secs.saturating_mul(1_000)),
            data: value,
        };
        let bytes = match serde_json::to_vec(&envelope) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.record_error("encode", &CacheError::from(err));
                return;
            }
        };
        let size_bytes = bytes.len() as u64;

        let evicted = self.memory().insert(
            *key,
            MemoryEntry {
                data: value.clone(),
                expires_at_ms: envelope.expires_at_ms,
                size_bytes,
            },
        );
        self.counters.evictions.fetch_add(evicted as u64, Ordering::Relaxed);

        let Some(disk) = &self.disk else {
            return;
        };
        let replaced = match disk.write(key, bytes).await {
            Ok(replaced) => replaced,
            Err(err) => {
                self.record_error("write", &err);
                return;
            }
        };
        let usage = self.adjust_disk_bytes(size_bytes, replaced);
        if usage > self.config.max_disk_bytes {
            match disk.prune(self.config.max_disk_bytes).await {
                Ok((remaining, removed)) => {
                    self.disk_bytes.store(remaining, Ordering::Relaxed);
                    self.counters.evictions.fetch_add(removed as u64, Ordering::Relaxed);
                    log::debug!("Pruned {removed} cache entries, {remaining} bytes remain");
                }
                Err(err) => self.record_error("prune", &err),
            }
        }
    }

    /// Expire the entry for `key` immediately
    pub async fn expire(&self, key: &CacheKey) {
        self.memory().remove(key);
        self.remove_from_disk(key).await;
    }

    pub fn stats(&self) -> CacheStats {
        let memory = self.memory();
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            memory_entries: memory.len(),
            memory_bytes: memory.bytes(),
            disk_bytes: self.disk_bytes.load(Ordering::Relaxed),
        }
    }

    /// Account for `added` new bytes replacing `removed` old ones; returns the new usage
    fn adjust_disk_bytes(&self, added: u64, removed: u64) -> u64 {
        let update = |used: u64| used.saturating_sub(removed).saturating_add(added);
        let previous = self
            .disk_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| Some(update(used)))
            .unwrap_or_else(|used| used);
        update(previous)
    }

    fn memory(&self) -> MutexGuard<'_, MemoryTier<T>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn remove_from_disk(&self, key: &CacheKey) {
        if let Some(disk) = &self.disk {
            match disk.remove(key).await {
                Ok(Some(removed)) => {
                    self.adjust_disk_bytes(0, removed);
                }
                Ok(None) => {}
                Err(err) => self.record_error("remove", &err),
            }
        }
    }

    fn miss(&self) -> Option<T> {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn record_error(&self, op: &str, err: &CacheError) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        log::warn!("Response cache {op} failed, continuing without cache: {err}");
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
