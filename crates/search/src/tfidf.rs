use crate::tokenize::TermVector;
use std::collections::HashMap;

/// Document frequency of every term over a chunk corpus.
///
/// Maintained incrementally as files are re-chunked; inverse document
/// frequencies are derived from it at query time.
#[derive(Debug, Clone, Default)]
pub struct DocumentFrequencies {
    df: HashMap<String, u32>,
    documents: usize,
}

impl DocumentFrequencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents<'a>(docs: impl IntoIterator<Item = &'a TermVector>) -> Self {
        let mut out = Self::new();
        for doc in docs {
            out.add(doc);
        }
        out
    }

    pub fn add(&mut self, doc: &TermVector) {
        self.documents += 1;
        for (term, _) in doc.iter() {
            *self.df.entry(term.to_string()).or_insert(0) += 1;
        }
    }

    pub fn remove(&mut self, doc: &TermVector) {
        self.documents = self.documents.saturating_sub(1);
        for (term, _) in doc.iter() {
            if let Some(count) = self.df.get_mut(term) {
                *count -= 1;
                if *count == 0 {
                    self.df.remove(term);
                }
            }
        }
    }

    pub fn documents(&self) -> usize {
        self.documents
    }

    pub fn frequency(&self, term: &str) -> u32 {
        self.df.get(term).copied().unwrap_or(0)
    }

    /// Smoothed inverse document frequency: `ln((1 + N) / (1 + df)) + 1`
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.documents as f64;
        let df = f64::from(self.frequency(term));
        ((1.0 + n) / (1.0 + df)).ln() + 1.0
    }
}

/// Sublinear term-frequency weight
pub fn tf_weight(count: u32) -> f64 {
    if count == 0 {
        0.0
    } else {
        1.0 + f64::from(count).ln()
    }
}

/// Weighted query vector with its norm, ready for cosine scoring
#[derive(Debug, Clone)]
pub struct QueryVector {
    weights: Vec<(String, f64)>,
    norm: f64,
}

impl QueryVector {
    pub fn new(query: &TermVector, df: &DocumentFrequencies) -> Self {
        let weights: Vec<(String, f64)> = query
            .iter()
            .map(|(term, count)| (term.to_string(), tf_weight(count) * df.idf(term)))
            .collect();
        let norm = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        Self { weights, norm }
    }

    /// Cosine similarity between the query and one document
    pub fn cosine(&self, doc: &TermVector, df: &DocumentFrequencies) -> f64 {
        if self.norm == 0.0 || doc.is_empty() {
            return 0.0;
        }
        let dot: f64 = self
            .weights
            .iter()
            .map(|(term, weight)| weight * tf_weight(doc.get(term)) * df.idf(term))
            .sum();
        if dot == 0.0 {
            return 0.0;
        }
        let doc_norm = doc
            .iter()
            .map(|(term, count)| {
                let w = tf_weight(count) * df.idf(term);
                w * w
            })
            .sum::<f64>()
            .sqrt();
        if doc_norm == 0.0 {
            0.0
        } else {
            dot / (self.norm * doc_norm)
        }
    }
}
