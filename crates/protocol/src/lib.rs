use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod fingerprint;

pub use fingerprint::{Fingerprint, FingerprintParseError, FINGERPRINT_LEN};

pub const RESPONSE_SCHEMA_VERSION: u32 = 1;

/// One chunk as handed to the caller, in presentation order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct ChunkView {
    pub file: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
    pub byte_start: usize,
    pub byte_end: usize,
    pub estimated_tokens: usize,
    #[schemars(with = "String")]
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct QueryResponse {
    pub chunks: Vec<ChunkView>,
    pub from_cache: bool,
    pub total_tokens: usize,
    pub token_budget: usize,
}

impl QueryResponse {
    #[must_use]
    pub fn empty(token_budget: usize) -> Self {
        Self {
            chunks: Vec::new(),
            from_cache: false,
            total_tokens: 0,
            token_budget,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
pub struct SessionStats {
    pub files_indexed: usize,
    pub chunks_total: usize,
    pub cache_hit_rate: f64,
    pub manifest_size: usize,
    #[serde(default)]
    pub graph_edges: usize,
    #[serde(default)]
    pub cache_hits: u64,
    #[serde(default)]
    pub cache_misses: u64,
    #[serde(default)]
    pub cache_errors: u64,
    #[serde(default)]
    pub parse_failures: u64,
    #[serde(default)]
    pub skipped_files: u64,
    #[serde(default)]
    pub manifest_recoveries: u64,
    #[serde(default)]
    pub reconciles: u64,
}

/// Outcome of one reconcile pass, as reported to callers.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, JsonSchema)]
pub struct ChangeSummary {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: usize,
}

impl ChangeSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_response_schema_names_public_fields() {
        let schema = schemars::schema_for!(QueryResponse);
        let rendered = serde_json::to_string(&schema).unwrap();
        for field in ["chunks", "from_cache", "file", "kind", "content", "fingerprint"] {
            assert!(rendered.contains(field), "schema misses {field}: {rendered}");
        }
    }

    #[test]
    fn chunk_view_omits_missing_name() {
        let view = ChunkView {
            file: "a.py".to_string(),
            kind: "imports".to_string(),
            name: None,
            content: "import os\n".to_string(),
            byte_start: 0,
            byte_end: 10,
            estimated_tokens: 3,
            fingerprint: Fingerprint::of("import os\n"),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("name").is_none());
        let back: ChunkView = serde_json::from_value(json).unwrap();
        assert_eq!(back, view);
    }

    #[test]
    fn change_summary_emptiness() {
        let mut summary = ChangeSummary::default();
        assert!(summary.is_empty());
        summary.deleted.push("gone.rs".to_string());
        assert!(!summary.is_empty());
    }
}
