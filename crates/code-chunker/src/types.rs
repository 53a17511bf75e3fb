use context_protocol::Fingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes per token used by every budget estimate in the engine.
pub const BYTES_PER_TOKEN: usize = 4;

/// Estimate tokens as `ceil(bytes / 4)`
#[must_use]
pub const fn estimate_tokens(byte_len: usize) -> usize {
    byte_len.div_ceil(BYTES_PER_TOKEN)
}

/// Stable chunk id derived from its location
#[must_use]
pub fn chunk_id(file_path: &str, byte_start: usize, byte_end: usize) -> String {
    format!("{file_path}:{byte_start}:{byte_end}")
}

/// Semantic category of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Imports,
    Class,
    Function,
    Method,
    FunctionPart,
    Generic,
}

impl ChunkKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Imports => "imports",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
            Self::FunctionPart => "function_part",
            Self::Generic => "generic",
        }
    }

    /// Whether chunks of this kind name a symbol other files may refer to
    pub const fn defines_symbol(self) -> bool {
        matches!(self, Self::Class | Self::Function)
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous byte range of one file.
///
/// `content` is exactly `file[byte_start..byte_end]`, so concatenating the
/// contents of a file's chunks in byte order reproduces the file.
/// `leading_context` is trailing text of the previous sub-chunk repeated for
/// readability; it is never counted as owned bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub file_path: String,
    pub kind: ChunkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 1-based index when a unit was split into several parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<u32>,
    pub byte_start: usize,
    pub byte_end: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub leading_context: String,
    pub content: String,
    pub fingerprint: Fingerprint,
}

impl Chunk {
    /// Create a chunk owning `content` starting at `byte_start`
    #[must_use]
    pub fn new(
        file_path: impl Into<String>,
        kind: ChunkKind,
        name: Option<String>,
        byte_start: usize,
        content: impl Into<String>,
    ) -> Self {
        let file_path = file_path.into();
        let content = content.into();
        let byte_end = byte_start + content.len();
        let fingerprint = Self::fingerprint_of("", &content);
        Self {
            id: chunk_id(&file_path, byte_start, byte_end),
            file_path,
            kind,
            name,
            part: None,
            byte_start,
            byte_end,
            leading_context: String::new(),
            content,
            fingerprint,
        }
    }

    /// Builder: set the part index
    #[must_use]
    pub const fn with_part(mut self, part: u32) -> Self {
        self.part = Some(part);
        self
    }

    /// Builder: attach overlap text carried from the previous part
    #[must_use]
    pub fn with_leading_context(mut self, context: impl Into<String>) -> Self {
        self.leading_context = context.into();
        self.fingerprint = Self::fingerprint_of(&self.leading_context, &self.content);
        self
    }

    fn fingerprint_of(leading: &str, content: &str) -> Fingerprint {
        Fingerprint::of_parts([leading, content])
    }

    /// Owned bytes, excluding overlap
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.byte_end - self.byte_start
    }

    /// Bytes handed to the caller, overlap included
    #[must_use]
    pub fn rendered_len(&self) -> usize {
        self.leading_context.len() + self.content.len()
    }

    #[must_use]
    pub fn rendered(&self) -> String {
        let mut out = String::with_capacity(self.rendered_len());
        out.push_str(&self.leading_context);
        out.push_str(&self.content);
        out
    }

    /// Get estimated token count
    #[must_use]
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(self.rendered_len())
    }

    #[must_use]
    pub fn is_imports(&self) -> bool {
        self.kind == ChunkKind::Imports
    }
}
