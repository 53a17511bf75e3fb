//! # Context Engine
//!
//! Answers "which code matters for this question?" under a token budget,
//! over a repository that keeps changing between questions.
//!
//! ## Query flow
//!
//! ```text
//! ContextSession::query(text, budget)
//!     │
//!     ├──> reconcile (serialized)
//!     │      ├─ DifferentialUpdater: added / modified / deleted
//!     │      ├─ re-chunk touched files only, persist chunks
//!     │      ├─ patch the reference graph and term frequencies
//!     │      └─ publish a new snapshot, save the manifest
//!     │
//!     ├──> RelevanceRanker over the published snapshot
//!     ├──> BudgetSelector (greedy, imports pulled along)
//!     └──> ResponseCache keyed by query + selected content
//! ```
//!
//! Unreadable files, parse failures, cache storage errors and a corrupt
//! manifest never fail a query; they show up in [`SessionStats`] and logs.

mod config;
mod error;
mod index;
mod session;

pub use config::{EngineConfig, CONFIG_FILE_NAME, ENV_PREFIX};
pub use error::{EngineError, Result};
pub use session::{ContextSession, SessionPhase};

pub use context_protocol::{ChangeSummary, ChunkView, Fingerprint, QueryResponse, SessionStats};
