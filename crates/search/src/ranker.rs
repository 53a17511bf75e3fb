use crate::tfidf::{DocumentFrequencies, QueryVector};
use crate::tokenize::TermVector;
use context_code_chunker::Chunk;
use context_graph::ReferenceGraph;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Weights applied on top of the TF-IDF cosine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Multiplier per referencing file: `1 + k * in_degree`
    pub centrality_weight: f64,
    /// Share of the best referencing file's score pulled into its dependencies
    pub dependency_weight: f64,
    /// Multiplier for the most recently modified files
    pub recency_weight: f64,
    /// Age at which the recency boost halves
    pub recency_half_life_hours: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            centrality_weight: 0.1,
            dependency_weight: 0.3,
            recency_weight: 0.05,
            recency_half_life_hours: 72.0,
        }
    }
}

impl RankerConfig {
    pub fn validate(&self) -> Result<(), String> {
        let weights = [
            ("centrality_weight", self.centrality_weight),
            ("dependency_weight", self.dependency_weight),
            ("recency_weight", self.recency_weight),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a non-negative number, got {value}"));
            }
        }
        if !(self.recency_half_life_hours.is_finite() && self.recency_half_life_hours > 0.0) {
            return Err(format!(
                "recency_half_life_hours must be positive, got {}",
                self.recency_half_life_hours
            ));
        }
        Ok(())
    }
}

/// A chunk as seen by the ranker
#[derive(Debug, Clone)]
pub struct RankDocument {
    pub chunk: Arc<Chunk>,
    pub terms: Arc<TermVector>,
    /// Modification time of the chunk's file (unix ms)
    pub modified_ms: u64,
}

impl RankDocument {
    pub fn new(chunk: Arc<Chunk>, modified_ms: u64) -> Self {
        let terms = Arc::new(TermVector::from_text(&chunk.rendered()));
        Self {
            chunk,
            terms,
            modified_ms,
        }
    }
}

/// Ranked chunk; `selected` is set by the budget selector
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,
    pub relevance_score: f32,
    pub selected: bool,
}

impl ScoredChunk {
    pub fn chunk_id(&self) -> &str {
        &self.chunk.id
    }
}

/// TF-IDF cosine ranking boosted by the reference graph
#[derive(Debug, Clone, Default)]
pub struct RelevanceRanker {
    config: RankerConfig,
}

impl RelevanceRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Rank every document against `query`.
    ///
    /// Scores are `(cosine + pull) * (1 + k * in_degree) * recency`, sorted
    /// descending with ties broken by `(file_path, byte_start)`. An empty query
    /// (after stopword removal) or an empty corpus yields an empty ranking.
    pub fn rank(
        &self,
        query: &str,
        docs: &[RankDocument],
        df: &DocumentFrequencies,
        graph: &ReferenceGraph,
    ) -> Vec<ScoredChunk> {
        let query_terms = TermVector::from_text(query);
        if query_terms.is_empty() || docs.is_empty() {
            return Vec::new();
        }
        let query_vector = QueryVector::new(&query_terms, df);

        let base: Vec<f64> = docs
            .iter()
            .map(|doc| query_vector.cosine(&doc.terms, df))
            .collect();

        let mut best_by_file: HashMap<&str, f64> = HashMap::new();
        for (doc, score) in docs.iter().zip(&base) {
            let best = best_by_file.entry(doc.chunk.file_path.as_str()).or_insert(0.0);
            *best = best.max(*score);
        }

        let newest = docs.iter().map(|doc| doc.modified_ms).max().unwrap_or(0);
        let mut pull_by_file: HashMap<&str, f64> = HashMap::new();
        let mut scored: Vec<ScoredChunk> = docs
            .iter()
            .zip(&base)
            .map(|(doc, base)| {
                let file = doc.chunk.file_path.as_str();
                let pull = *pull_by_file.entry(file).or_insert_with(|| {
                    graph
                        .dependents(file)
                        .into_iter()
                        .filter_map(|dependent| best_by_file.get(dependent))
                        .fold(0.0, |acc: f64, score| acc.max(*score))
                        * self.config.dependency_weight
                });
                let centrality = 1.0 + self.config.centrality_weight * graph.in_degree(file) as f64;
                let score = (base + pull) * centrality * self.recency(newest, doc.modified_ms);
                ScoredChunk {
                    chunk: Arc::clone(&doc.chunk),
                    relevance_score: score as f32,
                    selected: false,
                }
            })
            .collect();

        scored.sort_by(compare_ranked);
        log::debug!(
            "Ranked {} chunks for {:?} ({} query terms)",
            scored.len(),
            query,
            query_terms.len()
        );
        scored
    }

    /// Convenience for callers without precomputed term vectors
    pub fn rank_chunks(
        &self,
        query: &str,
        chunks: &[Arc<Chunk>],
        graph: &ReferenceGraph,
    ) -> Vec<ScoredChunk> {
        let docs: Vec<RankDocument> = chunks
            .iter()
            .map(|chunk| RankDocument::new(Arc::clone(chunk), 0))
            .collect();
        let df = DocumentFrequencies::from_documents(docs.iter().map(|doc| doc.terms.as_ref()));
        self.rank(query, &docs, &df, graph)
    }

    fn recency(&self, newest_ms: u64, modified_ms: u64) -> f64 {
        if self.config.recency_weight == 0.0 {
            return 1.0;
        }
        let age_hours = newest_ms.saturating_sub(modified_ms) as f64 / MS_PER_HOUR;
        let decay = 0.5f64.powf(age_hours / self.config.recency_half_life_hours);
        1.0 + self.config.recency_weight * decay
    }
}

fn compare_ranked(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.relevance_score
        .total_cmp(&a.relevance_score)
        .then_with(|| a.chunk.file_path.cmp(&b.chunk.file_path))
        .then_with(|| a.chunk.byte_start.cmp(&b.chunk.byte_start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_chunker::{ChunkKind, Language};
    use context_graph::FileReferences;
    use pretty_assertions::assert_eq;

    fn chunk(path: &str, start: usize, text: &str) -> Arc<Chunk> {
        Arc::new(Chunk::new(path, ChunkKind::Function, None, start, text))
    }

    fn order(ranked: &[ScoredChunk]) -> Vec<&str> {
        ranked.iter().map(|s| s.chunk_id()).collect()
    }

    #[test]
    fn empty_query_or_corpus_ranks_nothing() {
        let ranker = RelevanceRanker::default();
        let graph = ReferenceGraph::new();
        let chunks = vec![chunk("a.py", 0, "def foo(): pass\n")];
        assert!(ranker.rank_chunks("", &chunks, &graph).is_empty());
        assert!(ranker.rank_chunks("what is the", &chunks, &graph).is_empty());
        assert!(ranker.rank_chunks("foo", &[], &graph).is_empty());
    }

    #[test]
    fn textual_match_ranks_first() {
        let ranker = RelevanceRanker::default();
        let graph = ReferenceGraph::new();
        let chunks = vec![
            chunk("a.py", 0, "def render_page(html): return html\n"),
            chunk("b.py", 0, "def parse_config(path): return load(path)\n"),
        ];
        let ranked = ranker.rank_chunks("parse config", &chunks, &graph);
        assert_eq!(order(&ranked), vec!["b.py:0:42", "a.py:0:35"]);
        assert!(ranked[0].relevance_score > 0.0);
        assert_eq!(ranked[1].relevance_score, 0.0);
    }

    #[test]
    fn ties_break_by_path_then_offset() {
        let ranker = RelevanceRanker::default();
        let graph = ReferenceGraph::new();
        let chunks = vec![
            chunk("z.py", 10, "x = 1\n"),
            chunk("m.py", 20, "y = 2\n"),
            chunk("m.py", 0, "z = 3\n"),
        ];
        let ranked = ranker.rank_chunks("unrelated", &chunks, &graph);
        assert_eq!(order(&ranked), vec!["m.py:0:6", "m.py:20:26", "z.py:10:16"]);
    }

    #[test]
    fn referenced_files_are_boosted_and_pulled_in() {
        let a = "def foo():\n    return 42\n";
        let b = "import a\n\ndef bar():\n    return a.foo()\n";
        let c = "def baz():\n    return 7\n";
        let graph = ReferenceGraph::build([
            FileReferences::extract("a.py", a, Language::Python, ["foo"]),
            FileReferences::extract("b.py", b, Language::Python, ["bar"]),
            FileReferences::extract("c.py", c, Language::Python, ["baz"]),
        ]);
        let chunks = vec![chunk("c.py", 0, c), chunk("a.py", 0, a), chunk("b.py", 0, b)];
        let ranked = RelevanceRanker::default().rank_chunks("what does bar do", &chunks, &graph);
        assert_eq!(order(&ranked)[0], chunks[2].id);
        assert_eq!(order(&ranked)[1], chunks[1].id);
        assert!(ranked[1].relevance_score > ranked[2].relevance_score);
    }

    #[test]
    fn recency_prefers_newer_files_on_equal_text() {
        let ranker = RelevanceRanker::default();
        let graph = ReferenceGraph::new();
        let docs = vec![
            RankDocument::new(chunk("a.py", 0, "def load(): pass\n"), 0),
            RankDocument::new(chunk("b.py", 0, "def load(): pass\n"), 30 * 24 * 3_600_000),
        ];
        let df = DocumentFrequencies::from_documents(docs.iter().map(|d| d.terms.as_ref()));
        let ranked = ranker.rank("load", &docs, &df, &graph);
        assert_eq!(ranked[0].chunk.file_path, "b.py");
    }

    #[test]
    fn config_validation() {
        assert!(RankerConfig::default().validate().is_ok());
        let bad = RankerConfig {
            centrality_weight: -1.0,
            ..RankerConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
