//! # Context Graph
//!
//! File-level reference graph used to pull dependency context into query
//! results and to weight files by how many others depend on them.
//!
//! ## Architecture
//!
//! ```text
//! file content
//!     │
//!     ├──> FileReferences::extract (per-language patterns)
//!     │      ├─ import / use / include / require statements
//!     │      ├─ candidate paths, resolved against the repo root
//!     │      └─ identifiers + defined top-level symbols
//!     │
//!     └──> ReferenceGraph::apply(GraphPatch)
//!            ├─ replace the patched files' outgoing edges
//!            ├─ import edges + symbol_ref edges (unique definitions)
//!            ├─ late resolution of previously missing targets
//!            ├─ re-link of files mentioning symbols whose definitions changed
//!            └─ in-degree refresh for touched files only
//! ```
//!
//! Imports that resolve to nothing inside the repository (standard library,
//! third-party packages) are dropped.

mod extract;
mod graph;
pub mod resolve;
mod types;

pub use extract::MIN_SYMBOL_LEN;
pub use graph::ReferenceGraph;
pub use types::{
    Candidate, EdgeKind, FileReferences, GraphPatch, ImportSpec, PatchSummary, ReferenceEdge,
};
