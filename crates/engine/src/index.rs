use context_code_chunker::{Chunk, ChunkKind, SemanticChunker};
use context_graph::{FileReferences, ReferenceGraph};
use context_indexer::{FileRecord, Manifest};
use context_search::{DocumentFrequencies, RankDocument};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Chunks and term vectors of one indexed file
#[derive(Debug)]
pub struct IndexedFile {
    pub record: FileRecord,
    pub chunks: Vec<Arc<Chunk>>,
    pub(crate) docs: Vec<RankDocument>,
    pub parse_failed: bool,
}

/// A freshly chunked file plus the references extracted from it
pub(crate) struct BuiltFile {
    pub file: IndexedFile,
    pub references: FileReferences,
}

impl BuiltFile {
    /// Chunk `bytes` and extract its references
    pub fn from_bytes(chunker: &SemanticChunker, record: FileRecord, bytes: &[u8]) -> Self {
        let outcome = chunker.chunk_bytes(&record.path, bytes, record.language);
        let text = String::from_utf8_lossy(bytes);
        Self::assemble(record, outcome.chunks, outcome.parse_failure.is_some(), &text)
    }

    /// Rebuild from stored chunks; their contents concatenate to the file text
    pub fn from_chunks(record: FileRecord, chunks: Vec<Chunk>) -> Self {
        let text: String = chunks.iter().map(|chunk| chunk.content.as_str()).collect();
        Self::assemble(record, chunks, false, &text)
    }

    fn assemble(record: FileRecord, chunks: Vec<Chunk>, parse_failed: bool, text: &str) -> Self {
        let defines: Vec<String> = chunks
            .iter()
            .filter(|chunk| chunk.kind.defines_symbol() || chunk.kind == ChunkKind::FunctionPart)
            .filter_map(|chunk| chunk.name.clone())
            .collect();
        let references = FileReferences::extract(&record.path, text, record.language, defines);
        let chunks: Vec<Arc<Chunk>> = chunks.into_iter().map(Arc::new).collect();
        let docs = chunks
            .iter()
            .map(|chunk| RankDocument::new(Arc::clone(chunk), record.last_modified_ms))
            .collect();
        Self {
            file: IndexedFile {
                record,
                chunks,
                docs,
                parse_failed,
            },
            references,
        }
    }
}

/// Immutable view of the index published after each reconcile.
///
/// Queries hold an `Arc` to one snapshot for their whole duration; the
/// writer builds the next snapshot from a clone and swaps it in.
#[derive(Debug, Clone, Default)]
pub(crate) struct IndexSnapshot {
    pub manifest: Manifest,
    pub files: BTreeMap<String, Arc<IndexedFile>>,
    pub graph: ReferenceGraph,
    pub df: DocumentFrequencies,
    pub chunk_count: usize,
}

impl IndexSnapshot {
    pub fn remove_file(&mut self, path: &str) -> Option<Arc<IndexedFile>> {
        let old = self.files.remove(path)?;
        self.forget_terms(&old);
        Some(old)
    }

    pub fn insert_file(&mut self, file: IndexedFile) {
        for doc in &file.docs {
            self.df.add(&doc.terms);
        }
        self.chunk_count += file.chunks.len();
        if let Some(old) = self.files.insert(file.record.path.clone(), Arc::new(file)) {
            self.forget_terms(&old);
        }
    }

    fn forget_terms(&mut self, file: &IndexedFile) {
        for doc in &file.docs {
            self.df.remove(&doc.terms);
        }
        self.chunk_count -= file.chunks.len();
    }

    /// Every chunk of the index in path and byte order
    pub fn documents(&self) -> Vec<RankDocument> {
        self.files
            .values()
            .flat_map(|file| file.docs.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_chunker::{ChunkerConfig, Language};
    use context_protocol::Fingerprint;
    use pretty_assertions::assert_eq;

    fn record(path: &str, content: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            language: Language::from_path(path),
            fingerprint: Fingerprint::of(content),
            size_bytes: content.len() as u64,
            last_modified_ms: 0,
        }
    }

    #[test]
    fn stored_chunks_rebuild_the_same_file() {
        let chunker = SemanticChunker::new(ChunkerConfig::default()).unwrap();
        let code = "import os\n\ndef cwd():\n    return os.getcwd()\n";
        let fresh = BuiltFile::from_bytes(&chunker, record("util.py", code), code.as_bytes());
        let stored: Vec<Chunk> = fresh.file.chunks.iter().map(|c| (**c).clone()).collect();
        let restored = BuiltFile::from_chunks(record("util.py", code), stored);

        assert_eq!(restored.references, fresh.references);
        assert_eq!(restored.file.chunks, fresh.file.chunks);
        assert!(fresh.references.defines.contains("cwd"));
    }

    #[test]
    fn snapshot_keeps_counts_in_step() {
        let chunker = SemanticChunker::new(ChunkerConfig::default()).unwrap();
        let mut snapshot = IndexSnapshot::default();
        let code = "def a():\n    return 1\n";
        let built = BuiltFile::from_bytes(&chunker, record("a.py", code), code.as_bytes());
        snapshot.insert_file(built.file);
        assert_eq!(snapshot.chunk_count, 1);
        assert_eq!(snapshot.df.documents(), 1);

        let built = BuiltFile::from_bytes(&chunker, record("a.py", code), code.as_bytes());
        snapshot.insert_file(built.file);
        assert_eq!(snapshot.chunk_count, 1);
        assert_eq!(snapshot.df.documents(), 1);

        assert!(snapshot.remove_file("a.py").is_some());
        assert_eq!(snapshot.chunk_count, 0);
        assert_eq!(snapshot.df.documents(), 0);
        assert!(snapshot.documents().is_empty());
    }
}
