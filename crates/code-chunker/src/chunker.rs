use crate::ast_analyzer::AstAnalyzer;
use crate::config::ChunkerConfig;
use crate::error::{ChunkerError, ParseFailure, Result};
use crate::language::Language;
use crate::profile::SyntaxProfile;
use crate::strategy::{plan_units, window};
use crate::types::Chunk;
use std::borrow::Cow;

/// One way of turning file content into chunks
pub trait ChunkStrategy {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Chunk `content`. Returned chunks are sorted by `byte_start` and cover
    /// the content without gaps or overlap.
    fn chunk(
        &self,
        file_path: &str,
        content: &str,
    ) -> std::result::Result<Vec<Chunk>, ParseFailure>;
}

/// Chunks along the top-level declarations of a tree-sitter grammar
#[derive(Debug, Clone)]
pub struct SyntaxChunker {
    profile: &'static SyntaxProfile,
    config: ChunkerConfig,
}

impl SyntaxChunker {
    #[must_use]
    pub fn new(profile: &'static SyntaxProfile, config: ChunkerConfig) -> Self {
        Self { profile, config }
    }
}

impl ChunkStrategy for SyntaxChunker {
    fn name(&self) -> &'static str {
        self.profile.language.as_str()
    }

    fn chunk(
        &self,
        file_path: &str,
        content: &str,
    ) -> std::result::Result<Vec<Chunk>, ParseFailure> {
        if content.is_empty() {
            return Ok(Vec::new());
        }
        let failure = |err: ChunkerError| {
            ParseFailure::new(file_path, self.profile.language, err.to_string())
        };
        let mut analyzer = AstAnalyzer::new(self.profile).map_err(failure)?;
        let units = analyzer.units(content).map_err(failure)?;

        let pieces = if units.is_empty() {
            window(content, 0, content.len(), &self.config)
        } else {
            plan_units(units, content, &self.config)
        };
        Ok(pieces
            .into_iter()
            .map(|piece| piece.into_chunk(file_path, content))
            .collect())
    }
}

/// Language-agnostic sliding window that snaps to line boundaries
#[derive(Debug, Clone)]
pub struct GenericChunker {
    config: ChunkerConfig,
}

impl GenericChunker {
    #[must_use]
    pub const fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Infallible variant of [`ChunkStrategy::chunk`]
    #[must_use]
    pub fn chunk_text(&self, file_path: &str, content: &str) -> Vec<Chunk> {
        window(content, 0, content.len(), &self.config)
            .into_iter()
            .map(|piece| piece.into_chunk(file_path, content))
            .collect()
    }
}

impl ChunkStrategy for GenericChunker {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn chunk(
        &self,
        file_path: &str,
        content: &str,
    ) -> std::result::Result<Vec<Chunk>, ParseFailure> {
        Ok(self.chunk_text(file_path, content))
    }
}

/// Closed set of chunkers, selected by the language table
#[derive(Debug, Clone)]
pub enum ChunkerVariant {
    Syntax(SyntaxChunker),
    Generic(GenericChunker),
}

impl ChunkerVariant {
    #[must_use]
    pub fn for_language(language: Language, config: ChunkerConfig) -> Self {
        match language.syntax_profile() {
            Some(profile) => Self::Syntax(SyntaxChunker::new(profile, config)),
            None => Self::Generic(GenericChunker::new(config)),
        }
    }
}

impl ChunkStrategy for ChunkerVariant {
    fn name(&self) -> &'static str {
        match self {
            Self::Syntax(inner) => inner.name(),
            Self::Generic(inner) => inner.name(),
        }
    }

    fn chunk(
        &self,
        file_path: &str,
        content: &str,
    ) -> std::result::Result<Vec<Chunk>, ParseFailure> {
        match self {
            Self::Syntax(inner) => inner.chunk(file_path, content),
            Self::Generic(inner) => inner.chunk(file_path, content),
        }
    }
}

/// Chunks for one file plus the parse failure that forced a fallback, if any
#[derive(Debug, Clone, Default)]
pub struct ChunkOutcome {
    pub chunks: Vec<Chunk>,
    pub parse_failure: Option<ParseFailure>,
}

/// Main chunker interface: language dispatch with generic fallback
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    config: ChunkerConfig,
}

impl SemanticChunker {
    /// Create a new chunker with a validated configuration
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk text, detecting the language from `file_path`
    #[must_use]
    pub fn chunk_path(&self, file_path: &str, content: &str) -> ChunkOutcome {
        self.chunk(file_path, content, Language::from_path(file_path))
    }

    /// Chunk text with an explicit language.
    ///
    /// Never fails: a parse failure is logged, reported in the outcome, and the
    /// file is chunked generically instead.
    #[must_use]
    pub fn chunk(&self, file_path: &str, content: &str, language: Language) -> ChunkOutcome {
        let variant = ChunkerVariant::for_language(language, self.config.clone());
        match variant.chunk(file_path, content) {
            Ok(chunks) => ChunkOutcome {
                chunks,
                parse_failure: None,
            },
            Err(failure) => {
                log::warn!("{failure}; falling back to generic chunks");
                ChunkOutcome {
                    chunks: GenericChunker::new(self.config.clone()).chunk_text(file_path, content),
                    parse_failure: Some(failure),
                }
            }
        }
    }

    /// Chunk raw bytes. Content that is not valid UTF-8 is decoded lossily and
    /// chunked generically without attempting a parse.
    #[must_use]
    pub fn chunk_bytes(&self, file_path: &str, bytes: &[u8], language: Language) -> ChunkOutcome {
        match String::from_utf8_lossy(bytes) {
            Cow::Borrowed(text) => self.chunk(file_path, text, language),
            Cow::Owned(text) => {
                log::debug!("{file_path} is not valid UTF-8; using generic chunks");
                ChunkOutcome {
                    chunks: GenericChunker::new(self.config.clone()).chunk_text(file_path, &text),
                    parse_failure: None,
                }
            }
        }
    }
}
