//! # Context Search
//!
//! Relevance ranking and token-budgeted selection over indexed chunks.
//!
//! ## Scoring
//!
//! ```text
//! query ──> tokenize ──> TF-IDF vector
//!                            │
//!   chunk term vectors ──> cosine
//!                            │
//!   + dependency pull   (best score of a file that references this one)
//!   × centrality        (1 + k · in_degree)
//!   × recency           (decays with age relative to the newest file)
//!                            │
//!                            └──> sort: score ↓, file_path ↑, byte_start ↑
//! ```
//!
//! [`BudgetSelector`] then walks the ranking greedily, skipping chunks that
//! no longer fit, and pulls each picked file's imports chunk along when
//! there is room.

mod budget;
mod ranker;
mod tfidf;
mod tokenize;

pub use budget::{BudgetSelector, Selection};
pub use ranker::{RankDocument, RankerConfig, RelevanceRanker, ScoredChunk};
pub use tfidf::{tf_weight, DocumentFrequencies, QueryVector};
pub use tokenize::{tokenize, TermVector};
