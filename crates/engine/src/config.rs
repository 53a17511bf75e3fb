use anyhow::{anyhow, Context, Result};
use context_code_chunker::ChunkerConfig;
use context_indexer::{default_workers, ScanOptions};
use context_response_cache::CacheConfig;
use context_search::RankerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "engine.toml";
pub const ENV_PREFIX: &str = "CONTEXT_ENGINE_";

const DEFAULT_IO_TIMEOUT_MS: u64 = 3_000;

/// Engine settings, read from `<cache_dir>/engine.toml` and
/// `CONTEXT_ENGINE_*` environment variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chunker: ChunkerConfig,
    pub ranker: RankerConfig,
    pub cache: CacheConfig,
    pub scan: ScanOptions,
    /// Bound on every local file read and cache operation
    pub io_timeout_ms: u64,
    /// Parallel file reads and chunking jobs
    pub workers: usize,
    /// Skip re-hashing files whose size and mtime match the manifest
    pub trust_mtime: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            ranker: RankerConfig::default(),
            cache: CacheConfig::default(),
            scan: ScanOptions::default(),
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            workers: default_workers(),
            trust_mtime: false,
        }
    }
}

impl EngineConfig {
    /// Defaults, then `engine.toml` in `cache_dir` if present, then the
    /// process environment; validated.
    pub fn load(cache_dir: &Path) -> Result<Self> {
        let path = cache_dir.join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::from_toml(&raw)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("TOML parse error")
    }

    /// Apply `CONTEXT_ENGINE_*` overrides; empty values are ignored
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key {
                "MAX_CHUNK_BYTES" => self.chunker.max_chunk_bytes = parse_env(&name, value)?,
                "OVERLAP_BYTES" => self.chunker.overlap_bytes = parse_env(&name, value)?,
                "CENTRALITY_WEIGHT" => self.ranker.centrality_weight = parse_env(&name, value)?,
                "DEPENDENCY_WEIGHT" => self.ranker.dependency_weight = parse_env(&name, value)?,
                "RECENCY_WEIGHT" => self.ranker.recency_weight = parse_env(&name, value)?,
                "RECENCY_HALF_LIFE_HOURS" => {
                    self.ranker.recency_half_life_hours = parse_env(&name, value)?
                }
                "CACHE_ENABLED" => self.cache.enabled = parse_env(&name, value)?,
                "CACHE_TTL_SECS" => self.cache.ttl_secs = parse_env(&name, value)?,
                "CACHE_MAX_DISK_BYTES" => self.cache.max_disk_bytes = parse_env(&name, value)?,
                "CACHE_MAX_MEMORY_BYTES" => self.cache.max_memory_bytes = parse_env(&name, value)?,
                "MAX_FILE_BYTES" => self.scan.max_file_bytes = parse_env(&name, value)?,
                "INCLUDE_HIDDEN" => self.scan.include_hidden = parse_env(&name, value)?,
                "EXCLUDE" => {
                    self.scan.exclude = value
                        .split(',')
                        .map(str::trim)
                        .filter(|glob| !glob.is_empty())
                        .map(ToString::to_string)
                        .collect()
                }
                "IO_TIMEOUT_MS" => self.io_timeout_ms = parse_env(&name, value)?,
                "WORKERS" => self.workers = parse_env(&name, value)?,
                "TRUST_MTIME" => self.trust_mtime = parse_env(&name, value)?,
                _ => log::warn!("Ignoring unknown setting {name}"),
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.chunker.validate().context("chunker")?;
        self.ranker.validate().map_err(|e| anyhow!("ranker: {e}"))?;
        self.cache.validate().map_err(|e| anyhow!("cache: {e}"))?;
        if self.io_timeout_ms == 0 {
            return Err(anyhow!("io_timeout_ms must be positive"));
        }
        if self.workers == 0 {
            return Err(anyhow!("workers must be at least 1"));
        }
        Ok(())
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Cache settings with the engine-wide I/O timeout applied
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            io_timeout_ms: self.io_timeout_ms,
            ..self.cache.clone()
        }
    }
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| anyhow!("{name}={raw:?} is invalid: {e}"))
}
