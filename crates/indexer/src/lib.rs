//! # Context Indexer
//!
//! Keeps a repository's file baseline current with the least possible work.
//!
//! ## Pipeline
//!
//! ```text
//! Directory
//!     │
//!     ├──> FileScanner (.gitignore aware, noise dirs, excludes, size cap)
//!     │      └─> repo-relative paths
//!     │
//!     ├──> WorkerPool (bounded fan-out, per-read timeout)
//!     │      └─> size, mtime, SHA-256 fingerprint
//!     │
//!     └──> DifferentialUpdater::reconcile(manifest)
//!            ├─> ChangeSet { added, modified, deleted, unchanged }
//!            └─> next Manifest (persisted atomically by the caller)
//! ```
//!
//! [`ChunkStore`] persists chunk sets by content so a reopened session only
//! re-chunks files that actually changed.

mod chunk_store;
mod differential;
mod error;
mod limits;
mod manifest;
mod scanner;

pub use chunk_store::ChunkStore;
pub use differential::{ChangeSet, DifferentialUpdater, FileSnapshot, Reconciliation};
pub use error::{IndexerError, Result};
pub use limits::{default_workers, WorkerPool, WorkerPoolSnapshot};
pub use manifest::{FileRecord, Manifest, MANIFEST_FILE_NAME, MANIFEST_SCHEMA_VERSION};
pub use scanner::{relative_path, FileScanner, ScanOptions, ScannedFile};
