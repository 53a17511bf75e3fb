//! # Context Response Cache
//!
//! Caches engine responses keyed by the query text and the fingerprints of
//! the chunks selected for it.
//!
//! ```text
//! get(key) ──> memory LRU ──hit──> value
//!                 │ miss
//!                 └──> disk shard <hex[0..2]>/<hex[2..4]>/<hex>.json
//!                         ├─ expired → deleted, miss
//!                         └─ live    → promoted to memory, hit
//! ```
//!
//! Entries carry `created_at_ms`/`expires_at_ms`; both tiers are bounded in
//! bytes and evict least recently used entries first.

mod cache;
mod config;
mod disk;
mod error;
mod key;
mod memory;

pub use cache::{CacheStats, Clock, ResponseCache};
pub use config::{CacheConfig, DEFAULT_TTL_SECS};
pub use error::{CacheError, Result};
pub use key::CacheKey;
