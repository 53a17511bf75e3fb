use crate::ranker::ScoredChunk;
use context_code_chunker::Chunk;
use std::collections::HashMap;
use std::sync::Arc;

/// Chunks chosen for one query, in presentation order
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Grouped by file (files ordered by their best-ranked chunk), ascending
    /// byte order within a file
    pub chunks: Vec<Arc<Chunk>>,
    pub total_tokens: usize,
    pub token_budget: usize,
    /// Candidates existed but not even the smallest one fit
    pub budget_too_small: bool,
    /// Token cost of the cheapest candidate, reported with `budget_too_small`
    pub smallest_candidate_tokens: Option<usize>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Greedy selection of ranked chunks under a token budget
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetSelector;

impl BudgetSelector {
    pub fn new() -> Self {
        Self
    }

    /// Walk `ranked` in order, taking each chunk that still fits.
    ///
    /// A chunk that does not fit is skipped and the walk continues. When a
    /// non-import chunk is taken, its file's imports chunks are taken with it
    /// if both fit; if only the chunk fits it is taken alone. Marks
    /// `selected` on the taken entries of `ranked`.
    pub fn select(&self, ranked: &mut [ScoredChunk], token_budget: usize) -> Selection {
        let mut imports_by_file: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, scored) in ranked.iter().enumerate() {
            if scored.chunk.is_imports() {
                imports_by_file
                    .entry(scored.chunk.file_path.as_str())
                    .or_default()
                    .push(idx);
            }
        }

        let mut remaining = token_budget;
        // rank position at which each chunk was taken
        let mut taken: Vec<Option<usize>> = vec![None; ranked.len()];
        for idx in 0..ranked.len() {
            if taken[idx].is_some() {
                continue;
            }
            let chunk = &ranked[idx].chunk;
            let cost = chunk.estimated_tokens();
            if cost > remaining {
                continue;
            }
            if chunk.is_imports() {
                taken[idx] = Some(idx);
                remaining -= cost;
                continue;
            }

            let pending: Vec<usize> = imports_by_file
                .get(chunk.file_path.as_str())
                .map(|imports| {
                    imports
                        .iter()
                        .copied()
                        .filter(|&i| taken[i].is_none())
                        .collect()
                })
                .unwrap_or_default();
            let imports_cost: usize = pending
                .iter()
                .map(|&i| ranked[i].chunk.estimated_tokens())
                .sum();

            taken[idx] = Some(idx);
            remaining -= cost;
            if !pending.is_empty() && imports_cost <= remaining {
                for i in pending {
                    taken[i] = Some(idx);
                }
                remaining -= imports_cost;
            }
        }

        let mut file_order: HashMap<&str, usize> = HashMap::new();
        let mut picked: Vec<usize> = Vec::new();
        for (idx, rank) in taken.iter().enumerate() {
            if let Some(rank) = rank {
                let file = ranked[idx].chunk.file_path.as_str();
                let best = file_order.entry(file).or_insert(*rank);
                *best = (*best).min(*rank);
                picked.push(idx);
            }
        }
        picked.sort_by(|&a, &b| {
            let (ca, cb) = (&ranked[a].chunk, &ranked[b].chunk);
            file_order[ca.file_path.as_str()]
                .cmp(&file_order[cb.file_path.as_str()])
                .then_with(|| ca.file_path.cmp(&cb.file_path))
                .then_with(|| ca.byte_start.cmp(&cb.byte_start))
        });

        let chunks: Vec<Arc<Chunk>> =
            picked.iter().map(|&i| Arc::clone(&ranked[i].chunk)).collect();
        let total_tokens = token_budget - remaining;
        let budget_too_small = chunks.is_empty() && !ranked.is_empty();
        let smallest_candidate_tokens = if budget_too_small {
            ranked.iter().map(|s| s.chunk.estimated_tokens()).min()
        } else {
            None
        };
        for idx in picked {
            ranked[idx].selected = true;
        }

        if budget_too_small {
            log::debug!(
                "Token budget {token_budget} below smallest candidate ({smallest_candidate_tokens:?} tokens)"
            );
        }
        Selection {
            chunks,
            total_tokens,
            token_budget,
            budget_too_small,
            smallest_candidate_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_chunker::ChunkKind;
    use pretty_assertions::assert_eq;

    fn scored(path: &str, kind: ChunkKind, start: usize, bytes: usize, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Arc::new(Chunk::new(path, kind, None, start, "x".repeat(bytes))),
            relevance_score: score,
            selected: false,
        }
    }

    fn ids(selection: &Selection) -> Vec<&str> {
        selection.chunks.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn oversized_chunks_are_skipped_not_terminal() {
        let mut ranked = vec![
            scored("a.py", ChunkKind::Function, 0, 400, 0.9),
            scored("b.py", ChunkKind::Function, 0, 40, 0.5),
        ];
        let selection = BudgetSelector::new().select(&mut ranked, 20);
        assert_eq!(ids(&selection), vec!["b.py:0:40"]);
        assert_eq!(selection.total_tokens, 10);
        assert!(!ranked[0].selected);
        assert!(ranked[1].selected);
    }

    #[test]
    fn imports_come_along_when_they_fit() {
        let mut ranked = vec![
            scored("b.py", ChunkKind::Function, 20, 40, 0.9),
            scored("c.py", ChunkKind::Function, 0, 40, 0.4),
            scored("b.py", ChunkKind::Imports, 0, 20, 0.0),
        ];
        let selection = BudgetSelector::new().select(&mut ranked, 100);
        assert_eq!(ids(&selection), vec!["b.py:0:20", "b.py:20:60", "c.py:0:40"]);
        assert_eq!(selection.total_tokens, 25);
    }

    #[test]
    fn body_is_kept_when_imports_do_not_fit() {
        let mut ranked = vec![
            scored("b.py", ChunkKind::Function, 200, 40, 0.9),
            scored("b.py", ChunkKind::Imports, 0, 200, 0.0),
        ];
        let selection = BudgetSelector::new().select(&mut ranked, 20);
        assert_eq!(ids(&selection), vec!["b.py:200:240"]);
    }

    #[test]
    fn files_are_ordered_by_best_rank_and_chunks_by_offset() {
        let mut ranked = vec![
            scored("z.py", ChunkKind::Function, 100, 8, 0.9),
            scored("a.py", ChunkKind::Function, 0, 8, 0.8),
            scored("z.py", ChunkKind::Function, 0, 8, 0.7),
        ];
        let selection = BudgetSelector::new().select(&mut ranked, 100);
        assert_eq!(ids(&selection), vec!["z.py:0:8", "z.py:100:108", "a.py:0:8"]);
    }

    #[test]
    fn reports_budget_too_small() {
        let mut ranked = vec![scored("a.py", ChunkKind::Function, 0, 40, 0.9)];
        let selection = BudgetSelector::new().select(&mut ranked, 3);
        assert!(selection.is_empty());
        assert!(selection.budget_too_small);
        assert_eq!(selection.smallest_candidate_tokens, Some(10));

        let selection = BudgetSelector::new().select(&mut [], 3);
        assert!(!selection.budget_too_small);
    }

    mod budget_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_exceeds_budget(
                sizes in prop::collection::vec((1usize..400, any::<bool>(), 0usize..4), 0..24),
                budget in 0usize..300,
            ) {
                let mut ranked: Vec<ScoredChunk> = sizes
                    .iter()
                    .enumerate()
                    .map(|(idx, &(bytes, imports, file))| {
                        let kind = if imports { ChunkKind::Imports } else { ChunkKind::Function };
                        let score = 1.0 / (idx as f32 + 1.0);
                        scored(&format!("f{file}.py"), kind, idx * 1_000, bytes, score)
                    })
                    .collect();
                let selection = BudgetSelector::new().select(&mut ranked, budget);
                let spent: usize = selection.chunks.iter().map(|c| c.estimated_tokens()).sum();
                prop_assert_eq!(spent, selection.total_tokens);
                prop_assert!(spent <= budget);
                prop_assert_eq!(
                    ranked.iter().filter(|s| s.selected).count(),
                    selection.chunks.len()
                );
            }
        }
    }
}
