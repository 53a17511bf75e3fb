//! # Context Code Chunker
//!
//! Splits source files into semantic chunks: the file's imports, each
//! top-level class (methods included), each free function, and generic
//! windows for everything else.
//!
//! ## Guarantees
//!
//! - Chunks of one file are sorted by `byte_start`, never overlap, and
//!   together cover every byte of the file.
//! - No chunk owns more than `max_chunk_bytes`. Oversized classes are split at
//!   their methods; oversized functions become numbered `function_part` chunks
//!   cut at statement-level lines, each carrying up to `overlap_bytes` of the
//!   previous part as leading context.
//! - Files that fail to parse are still chunked (generically); the failure is
//!   reported next to the chunks rather than raised.
//!
//! ## Architecture
//!
//! ```text
//! Source Code
//!     │
//!     ├──> Language Detection (extension → syntax profile)
//!     │
//!     ├──> ChunkerVariant
//!     │    ├─> Syntax: tree-sitter parse → top-level units → gap filling
//!     │    └─> Generic: line-snapped sliding window
//!     │
//!     └──> Size enforcement
//!          ├─> Class → header + methods
//!          ├─> Function → function_part chunks (+ overlap)
//!          └─> Emit Chunk[] with fingerprints
//! ```
//!
//! ## Example
//!
//! ```rust
//! use context_code_chunker::{ChunkKind, ChunkerConfig, SemanticChunker};
//!
//! let chunker = SemanticChunker::new(ChunkerConfig::default()).unwrap();
//! let code = "import os\n\ndef cwd():\n    return os.getcwd()\n";
//!
//! let outcome = chunker.chunk_path("util.py", code);
//! assert_eq!(outcome.chunks[0].kind, ChunkKind::Imports);
//! assert_eq!(outcome.chunks[1].name.as_deref(), Some("cwd"));
//! ```

mod ast_analyzer;
mod chunker;
mod config;
mod error;
mod language;
mod profile;
mod strategy;
mod types;

pub use chunker::{
    ChunkOutcome, ChunkStrategy, ChunkerVariant, GenericChunker, SemanticChunker, SyntaxChunker,
};
pub use config::{ChunkerConfig, MIN_CHUNK_BYTES};
pub use error::{ChunkerError, ParseFailure, Result};
pub use language::Language;
pub use profile::SyntaxProfile;
pub use types::{chunk_id, estimate_tokens, Chunk, ChunkKind, BYTES_PER_TOKEN};
