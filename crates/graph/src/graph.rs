use crate::types::{Candidate, EdgeKind, FileReferences, GraphPatch, PatchSummary, ReferenceEdge};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
struct FileEntry {
    index: NodeIndex,
    refs: FileReferences,
    /// Exact candidate paths that did not resolve when this file was applied
    wanted: BTreeSet<String>,
}

/// File-level reference graph with in-degree centrality.
///
/// Nodes are repo-relative paths of indexed files; there is at most one edge
/// per ordered pair, and an `import` edge supersedes a `symbol_ref` edge.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    graph: StableDiGraph<String, EdgeKind>,
    files: HashMap<String, FileEntry>,
    /// Top-level symbol name -> files defining it
    definitions: HashMap<String, BTreeSet<String>>,
    /// Identifier -> files mentioning it
    mentioned_by: HashMap<String, BTreeSet<String>>,
    /// Missing path -> files whose imports would resolve to it
    wanted_by: HashMap<String, BTreeSet<String>>,
    by_file_name: HashMap<String, BTreeSet<String>>,
    in_degree: HashMap<String, usize>,
}

impl ReferenceGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from scratch for a whole set of files
    #[must_use]
    pub fn build(files: impl IntoIterator<Item = FileReferences>) -> Self {
        let mut graph = Self::new();
        let summary = graph.apply(GraphPatch {
            upserts: files.into_iter().collect(),
            removals: Vec::new(),
        });
        log::info!(
            "Built reference graph: {} files, {} edges",
            summary.files_added,
            graph.edge_count()
        );
        graph
    }

    /// Replace one file's content; only its outgoing edges are re-derived
    pub fn update(&mut self, refs: FileReferences) -> PatchSummary {
        self.apply(GraphPatch::upsert(refs))
    }

    /// Drop a file together with every edge touching it
    pub fn remove(&mut self, path: &str) -> PatchSummary {
        self.apply(GraphPatch::remove(path))
    }

    /// Apply a batch of removals and replacements.
    ///
    /// All upserted files are registered before any edge is resolved, so files
    /// in the same batch can reference each other. Files outside the patch
    /// that mention a symbol whose definitions changed are re-linked, so the
    /// result matches a [`ReferenceGraph::build`] over the same contents.
    pub fn apply(&mut self, patch: GraphPatch) -> PatchSummary {
        let mut summary = PatchSummary::default();
        let mut dirty = BTreeSet::new();
        // symbols whose set of defining files changed
        let mut redefined = BTreeSet::new();

        for path in &patch.removals {
            if let Some(entry) = self.files.get(path) {
                redefined.extend(entry.refs.defines.iter().cloned());
            }
            if self.drop_file(path, &mut dirty, &mut summary) {
                summary.files_removed += 1;
            }
        }

        let mut new_files = Vec::new();
        let mut touched = Vec::with_capacity(patch.upserts.len());
        for refs in patch.upserts {
            let path = refs.path.clone();
            if let Some(entry) = self.files.get(&path) {
                redefined.extend(entry.refs.defines.symmetric_difference(&refs.defines).cloned());
                self.clear_outgoing(&path, &mut dirty, &mut summary);
                self.unregister(&path);
                if let Some(entry) = self.files.get_mut(&path) {
                    entry.refs = refs;
                }
            } else {
                redefined.extend(refs.defines.iter().cloned());
                let index = self.graph.add_node(path.clone());
                self.register_name(&path);
                self.files.insert(
                    path.clone(),
                    FileEntry {
                        index,
                        refs,
                        wanted: BTreeSet::new(),
                    },
                );
                new_files.push(path.clone());
                summary.files_added += 1;
            }
            self.register(&path);
            dirty.insert(path.clone());
            touched.push(path);
        }

        for path in &touched {
            self.resolve_outgoing(path, &mut dirty, &mut summary);
        }

        for path in &new_files {
            let Some(waiting) = self.wanted_by.remove(path) else {
                continue;
            };
            for from in waiting {
                if from == *path {
                    continue;
                }
                if let Some(entry) = self.files.get_mut(&from) {
                    entry.wanted.remove(path);
                }
                if self.link(&from, path, EdgeKind::Import) {
                    summary.edges_added += 1;
                    dirty.insert(from);
                }
            }
        }

        let stale: BTreeSet<String> = redefined
            .iter()
            .filter_map(|name| self.mentioned_by.get(name))
            .flatten()
            .filter(|path| !touched.contains(*path))
            .cloned()
            .collect();
        for path in &stale {
            self.relink(path, &mut dirty, &mut summary);
        }

        summary.recomputed = self.refresh_centrality(&dirty);
        summary
    }

    fn drop_file(
        &mut self,
        path: &str,
        dirty: &mut BTreeSet<String>,
        summary: &mut PatchSummary,
    ) -> bool {
        let Some(entry) = self.files.get(path) else {
            return false;
        };
        let index = entry.index;

        // Importers keep wanting this path so the edge returns if the file does.
        let importers: Vec<String> = self
            .graph
            .edges_directed(index, Direction::Incoming)
            .filter(|edge| *edge.weight() == EdgeKind::Import)
            .map(|edge| self.graph[edge.source()].clone())
            .collect();
        for from in importers {
            self.wanted_by.entry(path.to_string()).or_default().insert(from.clone());
            if let Some(from_entry) = self.files.get_mut(&from) {
                from_entry.wanted.insert(path.to_string());
            }
        }

        for neighbor in self.graph.neighbors_undirected(index) {
            dirty.insert(self.graph[neighbor].clone());
        }
        summary.edges_removed += self.graph.edges_directed(index, Direction::Incoming).count()
            + self.graph.edges_directed(index, Direction::Outgoing).count();

        self.unregister(path);
        self.unregister_name(path);
        self.graph.remove_node(index);
        self.files.remove(path);
        self.in_degree.remove(path);
        dirty.remove(path);
        true
    }

    fn clear_outgoing(
        &mut self,
        path: &str,
        dirty: &mut BTreeSet<String>,
        summary: &mut PatchSummary,
    ) {
        let Some(entry) = self.files.get(path) else {
            return;
        };
        let edges: Vec<_> = self
            .graph
            .edges_directed(entry.index, Direction::Outgoing)
            .map(|edge| (edge.id(), edge.target()))
            .collect();
        for (edge, target) in edges {
            dirty.insert(self.graph[target].clone());
            self.graph.remove_edge(edge);
            summary.edges_removed += 1;
        }
    }

    /// Forget a file's symbol definitions, mentions and pending imports
    fn unregister(&mut self, path: &str) {
        let Some(entry) = self.files.get(path) else {
            return;
        };
        for name in &entry.refs.defines {
            detach(&mut self.definitions, name, path);
        }
        for ident in &entry.refs.identifiers {
            detach(&mut self.mentioned_by, ident, path);
        }
        self.forget_wanted(path);
    }

    fn forget_wanted(&mut self, path: &str) {
        let Some(entry) = self.files.get_mut(path) else {
            return;
        };
        for missing in std::mem::take(&mut entry.wanted) {
            detach(&mut self.wanted_by, &missing, path);
        }
    }

    fn register(&mut self, path: &str) {
        let Some(entry) = self.files.get(path) else {
            return;
        };
        for name in &entry.refs.defines {
            self.definitions
                .entry(name.clone())
                .or_default()
                .insert(path.to_string());
        }
        for ident in &entry.refs.identifiers {
            self.mentioned_by
                .entry(ident.clone())
                .or_default()
                .insert(path.to_string());
        }
    }

    fn register_name(&mut self, path: &str) {
        let name = path.rsplit('/').next().unwrap_or(path);
        self.by_file_name
            .entry(name.to_string())
            .or_default()
            .insert(path.to_string());
    }

    fn unregister_name(&mut self, path: &str) {
        let name = path.rsplit('/').next().unwrap_or(path);
        detach(&mut self.by_file_name, name, path);
    }

    /// Re-derive the outgoing edges of a file the patch did not touch
    fn relink(&mut self, path: &str, dirty: &mut BTreeSet<String>, summary: &mut PatchSummary) {
        let before = self.targets(path);
        let mut scratch = PatchSummary::default();
        self.clear_outgoing(path, dirty, &mut scratch);
        self.forget_wanted(path);
        self.resolve_outgoing(path, dirty, &mut scratch);
        let after = self.targets(path);
        summary.edges_added += after.difference(&before).count();
        summary.edges_removed += before.difference(&after).count();
    }

    fn targets(&self, path: &str) -> BTreeSet<String> {
        self.neighbors(path, Direction::Outgoing)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn resolve_outgoing(
        &mut self,
        path: &str,
        dirty: &mut BTreeSet<String>,
        summary: &mut PatchSummary,
    ) {
        let Some(entry) = self.files.get(path) else {
            return;
        };

        let mut targets: Vec<(String, EdgeKind)> = Vec::new();
        let mut wanted = BTreeSet::new();
        for spec in &entry.refs.imports {
            match spec.candidates.iter().find_map(|c| self.lookup(c, path)) {
                Some(target) => targets.push((target, EdgeKind::Import)),
                None => wanted.extend(spec.candidates.iter().filter_map(|c| match c {
                    Candidate::Exact(p) if p != path => Some(p.clone()),
                    _ => None,
                })),
            }
        }
        for ident in &entry.refs.identifiers {
            if entry.refs.defines.contains(ident) {
                continue;
            }
            if let Some(owners) = self.definitions.get(ident) {
                if owners.len() == 1 {
                    if let Some(owner) = owners.iter().next() {
                        if owner != path {
                            targets.push((owner.clone(), EdgeKind::SymbolRef));
                        }
                    }
                }
            }
        }

        for (target, kind) in targets {
            if self.link(path, &target, kind) {
                summary.edges_added += 1;
                dirty.insert(target);
            }
        }
        for missing in &wanted {
            self.wanted_by
                .entry(missing.clone())
                .or_default()
                .insert(path.to_string());
        }
        if let Some(entry) = self.files.get_mut(path) {
            entry.wanted = wanted;
        }
    }

    fn lookup(&self, candidate: &Candidate, from: &str) -> Option<String> {
        match candidate {
            Candidate::Exact(path) => self
                .files
                .contains_key(path)
                .then(|| path.clone())
                .filter(|path| path != from),
            Candidate::Suffix(suffix) => {
                let name = suffix.rsplit('/').next().unwrap_or(suffix);
                self.by_file_name
                    .get(name)?
                    .iter()
                    .find(|path| {
                        path.as_str() != from
                            && (path.as_str() == suffix || path.ends_with(&format!("/{suffix}")))
                    })
                    .cloned()
            }
        }
    }

    /// Add or upgrade the edge `from -> to`. Returns whether a new edge was created.
    fn link(&mut self, from: &str, to: &str, kind: EdgeKind) -> bool {
        let (Some(from_entry), Some(to_entry)) = (self.files.get(from), self.files.get(to))
        else {
            return false;
        };
        let (a, b) = (from_entry.index, to_entry.index);
        match self.graph.find_edge(a, b) {
            Some(edge) => {
                if kind == EdgeKind::Import {
                    if let Some(weight) = self.graph.edge_weight_mut(edge) {
                        *weight = EdgeKind::Import;
                    }
                }
                false
            }
            None => {
                self.graph.add_edge(a, b, kind);
                true
            }
        }
    }

    /// Recompute in-degree for the given files only
    fn refresh_centrality(&mut self, dirty: &BTreeSet<String>) -> usize {
        let mut recomputed = 0;
        for path in dirty {
            if let Some(entry) = self.files.get(path) {
                let degree = self
                    .graph
                    .neighbors_directed(entry.index, Direction::Incoming)
                    .count();
                self.in_degree.insert(path.clone(), degree);
                recomputed += 1;
            } else {
                self.in_degree.remove(path);
            }
        }
        recomputed
    }

    /// Number of distinct files referencing `path`
    #[must_use]
    pub fn in_degree(&self, path: &str) -> usize {
        self.in_degree.get(path).copied().unwrap_or(0)
    }

    /// Files that reference `path`, sorted
    #[must_use]
    pub fn dependents(&self, path: &str) -> Vec<&str> {
        self.neighbors(path, Direction::Incoming)
    }

    /// Files referenced by `path`, sorted
    #[must_use]
    pub fn dependencies(&self, path: &str) -> Vec<&str> {
        self.neighbors(path, Direction::Outgoing)
    }

    fn neighbors(&self, path: &str, direction: Direction) -> Vec<&str> {
        let Some(entry) = self.files.get(path) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(entry.index, direction)
            .map(|idx| self.graph[idx].as_str())
            .collect();
        out.sort_unstable();
        out
    }

    /// All edges, sorted by `(from_file, to_file)`
    #[must_use]
    pub fn edges(&self) -> Vec<ReferenceEdge> {
        let mut edges: Vec<ReferenceEdge> = self
            .graph
            .edge_references()
            .map(|edge| ReferenceEdge {
                from_file: self.graph[edge.source()].clone(),
                to_file: self.graph[edge.target()].clone(),
                kind: *edge.weight(),
            })
            .collect();
        edges.sort();
        edges
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Remove `path` from the set under `key`, dropping the set once empty
fn detach(index: &mut HashMap<String, BTreeSet<String>>, key: &str, path: &str) {
    if let Some(paths) = index.get_mut(key) {
        paths.remove(path);
        if paths.is_empty() {
            index.remove(key);
        }
    }
}
