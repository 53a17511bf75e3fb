use context_code_chunker::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Why one file points at another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Explicit import/include/use statement
    Import,
    /// Identifier defined only in the target file
    SymbolRef,
}

impl EdgeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::SymbolRef => "symbol_ref",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed edge between two repo-relative file paths
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceEdge {
    pub from_file: String,
    pub to_file: String,
    pub kind: EdgeKind,
}

/// A possible location of an imported file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "match", content = "path", rename_all = "snake_case")]
pub enum Candidate {
    /// Exact repo-relative path
    Exact(String),
    /// Any file whose path ends with this suffix (Java-style package paths)
    Suffix(String),
}

/// One import statement and the paths it may refer to, best first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSpec {
    pub raw: String,
    pub candidates: Vec<Candidate>,
}

/// Everything the graph needs to know about one file's outgoing references.
///
/// Derived from file content alone, so it can be computed in parallel and
/// persisted next to the file's chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReferences {
    pub path: String,
    pub language: Language,
    pub imports: Vec<ImportSpec>,
    /// Identifiers mentioned in the file
    pub identifiers: BTreeSet<String>,
    /// Top-level symbols defined by the file
    pub defines: BTreeSet<String>,
}

/// A batch of file replacements and removals applied atomically
#[derive(Debug, Clone, Default)]
pub struct GraphPatch {
    pub upserts: Vec<FileReferences>,
    pub removals: Vec<String>,
}

impl GraphPatch {
    #[must_use]
    pub fn upsert(refs: FileReferences) -> Self {
        Self {
            upserts: vec![refs],
            removals: Vec::new(),
        }
    }

    #[must_use]
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            upserts: Vec::new(),
            removals: vec![path.into()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }
}

/// Counters describing what one patch changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub files_added: usize,
    pub files_removed: usize,
    pub edges_added: usize,
    pub edges_removed: usize,
    /// Files whose centrality was recomputed
    pub recomputed: usize,
}
