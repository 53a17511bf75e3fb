use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::index::{BuiltFile, IndexSnapshot};
use context_code_chunker::{Chunk, SemanticChunker};
use context_graph::{GraphPatch, ReferenceGraph};
use context_indexer::{
    ChunkStore, DifferentialUpdater, FileRecord, FileScanner, FileSnapshot, IndexerError,
    Manifest, Reconciliation, WorkerPool, MANIFEST_FILE_NAME,
};
use context_protocol::{ChangeSummary, ChunkView, Fingerprint, QueryResponse, SessionStats};
use context_response_cache::{CacheKey, ResponseCache};
use context_search::{BudgetSelector, RelevanceRanker, Selection};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

const CHUNK_STORE_DIR: &str = "chunks";
const RESPONSE_CACHE_DIR: &str = "responses";

/// Lifecycle of a session's index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing indexed yet; the first query or reconcile builds the index
    Empty,
    /// At least one reconcile (or a restore from disk) has completed
    Indexed,
}

#[derive(Debug, Default)]
struct SessionCounters {
    parse_failures: AtomicU64,
    skipped_files: AtomicU64,
    manifest_recoveries: AtomicU64,
    reconciles: AtomicU64,
}

/// A code-context session over one repository.
///
/// Every query first reconciles the index against the working tree, then
/// ranks and selects chunks from an immutable snapshot. Reconciles are
/// serialized; queries never block each other and never observe a
/// half-applied update.
pub struct ContextSession {
    repo_root: PathBuf,
    cache_dir: PathBuf,
    config: EngineConfig,
    chunker: Arc<SemanticChunker>,
    ranker: RelevanceRanker,
    selector: BudgetSelector,
    updater: DifferentialUpdater,
    pool: WorkerPool,
    store: Arc<ChunkStore>,
    cache: ResponseCache<QueryResponse>,
    manifest_path: PathBuf,
    state: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<()>,
    indexed: AtomicBool,
    counters: SessionCounters,
}

impl std::fmt::Debug for ContextSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSession")
            .field("repo_root", &self.repo_root)
            .field("cache_dir", &self.cache_dir)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl ContextSession {
    /// Open a session with settings from `<cache_dir>/engine.toml` and the
    /// environment.
    ///
    /// Fails only when `repo_root` is not a readable directory or the
    /// configuration is invalid. A missing or corrupt manifest starts from an
    /// empty index.
    pub async fn open(repo_root: impl AsRef<Path>, cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&cache_dir).await?;
        let config = EngineConfig::load(&cache_dir)
            .map_err(|err| EngineError::InvalidConfig(format!("{err:#}")))?;
        Self::open_with_config(repo_root, cache_dir, config).await
    }

    pub async fn open_with_config(
        repo_root: impl AsRef<Path>,
        cache_dir: impl AsRef<Path>,
        config: EngineConfig,
    ) -> Result<Self> {
        let repo_root = canonical_root(repo_root.as_ref()).await?;
        let cache_dir = cache_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&cache_dir).await?;
        let cache_dir = tokio::fs::canonicalize(&cache_dir).await.unwrap_or(cache_dir);
        config
            .validate()
            .map_err(|err| EngineError::InvalidConfig(format!("{err:#}")))?;

        let chunker = SemanticChunker::new(config.chunker.clone())
            .map_err(|err| EngineError::InvalidConfig(err.to_string()))?;
        let scanner = FileScanner::new(&repo_root, config.scan.clone())?.skipping(&cache_dir);
        let pool = WorkerPool::new(config.workers);
        let updater = DifferentialUpdater::new(scanner, pool.clone())
            .with_io_timeout(config.io_timeout())
            .trust_mtime(config.trust_mtime);
        let store =
            ChunkStore::open(cache_dir.join(CHUNK_STORE_DIR), chunker.config().signature()).await?;
        let cache =
            ResponseCache::open(cache_dir.join(RESPONSE_CACHE_DIR), config.cache_config()).await;

        let session = Self {
            manifest_path: cache_dir.join(MANIFEST_FILE_NAME),
            repo_root,
            cache_dir,
            ranker: RelevanceRanker::new(config.ranker.clone()),
            config,
            chunker: Arc::new(chunker),
            selector: BudgetSelector::new(),
            updater,
            pool,
            store: Arc::new(store),
            cache,
            state: RwLock::new(Arc::new(IndexSnapshot::default())),
            writer: Mutex::new(()),
            indexed: AtomicBool::new(false),
            counters: SessionCounters::default(),
        };
        session.restore().await?;
        log::info!(
            "Opened context session for {} ({} files restored)",
            session.repo_root.display(),
            session.snapshot().files.len()
        );
        Ok(session)
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        if self.indexed.load(Ordering::Acquire) {
            SessionPhase::Indexed
        } else {
            SessionPhase::Empty
        }
    }

    /// Select the chunks most relevant to `text` whose estimated tokens fit
    /// in `token_budget`.
    ///
    /// A failed reconcile is logged and the query is answered from the last
    /// published index. Fails with [`EngineError::BudgetTooSmall`] when there
    /// are candidates but none of them fits.
    pub async fn query(&self, text: &str, token_budget: usize) -> Result<QueryResponse> {
        if let Err(err) = self.refresh().await {
            log::warn!("Reconcile failed, answering from the last index: {err}");
        }
        let snapshot = self.snapshot();
        let ranker = self.ranker.clone();
        let selector = self.selector;
        let query = text.to_string();
        let selection = self
            .pool
            .run_blocking(move || {
                let docs = snapshot.documents();
                let mut ranked = ranker.rank(&query, &docs, &snapshot.df, &snapshot.graph);
                selector.select(&mut ranked, token_budget)
            })
            .await?;

        if selection.budget_too_small {
            return Err(EngineError::BudgetTooSmall {
                budget: token_budget,
                required: selection.smallest_candidate_tokens.unwrap_or(token_budget + 1),
            });
        }
        if selection.is_empty() {
            log::debug!("No chunks matched {text:?}");
            return Ok(QueryResponse::empty(token_budget));
        }

        let fingerprints: Vec<Fingerprint> = selection
            .chunks
            .iter()
            .map(|chunk| chunk.fingerprint)
            .collect();
        let key = CacheKey::new(text, &fingerprints);
        if let Some(cached) = self.cache.get(&key).await {
            if let Some(response) = remap_cached(cached, &selection) {
                log::debug!("Cache hit {key} for {text:?}");
                return Ok(response);
            }
            log::warn!("Cached response {key} does not match its selection; rebuilding");
        }

        let response = build_response(&selection);
        self.cache.put(&key, &response).await;
        Ok(response)
    }

    /// Bring the index up to date with the working tree and report what
    /// changed since the previous reconcile.
    pub async fn reconcile(&self) -> Result<ChangeSummary> {
        self.refresh().await
    }

    pub fn stats(&self) -> SessionStats {
        let snapshot = self.snapshot();
        let cache = self.cache.stats();
        SessionStats {
            files_indexed: snapshot.files.len(),
            chunks_total: snapshot.chunk_count,
            cache_hit_rate: cache.hit_rate(),
            manifest_size: snapshot.manifest.len(),
            graph_edges: snapshot.graph.edge_count(),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            cache_errors: cache.errors,
            parse_failures: self.counters.parse_failures.load(Ordering::Relaxed),
            skipped_files: self.counters.skipped_files.load(Ordering::Relaxed),
            manifest_recoveries: self.counters.manifest_recoveries.load(Ordering::Relaxed),
            reconciles: self.counters.reconciles.load(Ordering::Relaxed),
        }
    }

    /// Chunks currently indexed for a repo-relative path
    pub fn indexed_chunks(&self, path: &str) -> Option<Vec<Arc<Chunk>>> {
        self.snapshot().files.get(path).map(|file| file.chunks.clone())
    }

    /// Indexed files that import or reference `path`
    pub fn dependents(&self, path: &str) -> Vec<String> {
        self.snapshot()
            .graph
            .dependents(path)
            .into_iter()
            .map(ToString::to_string)
            .collect()
    }

    fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, next: IndexSnapshot) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    async fn refresh(&self) -> Result<ChangeSummary> {
        let _writer = self.writer.lock().await;
        let current = self.snapshot();
        let Reconciliation {
            changes,
            manifest,
            skipped,
        } = self.updater.reconcile(&current.manifest).await?;
        self.counters.reconciles.fetch_add(1, Ordering::Relaxed);
        self.counters.skipped_files.store(skipped.len() as u64, Ordering::Relaxed);
        let summary = changes.summary();

        if changes.is_empty() {
            if manifest != current.manifest {
                self.persist_manifest(&manifest).await;
                let mut next = (*current).clone();
                next.manifest = manifest;
                self.publish(next);
            }
            self.indexed.store(true, Ordering::Release);
            return Ok(summary);
        }

        let superseded: Vec<(String, Fingerprint)> = changes
            .modified
            .iter()
            .map(|snapshot| snapshot.record.path.as_str())
            .chain(changes.deleted.iter().map(String::as_str))
            .filter_map(|path| current.manifest.get(path))
            .map(|record| (record.path.clone(), record.fingerprint))
            .collect();
        let touched: Vec<FileSnapshot> =
            changes.added.into_iter().chain(changes.modified).collect();
        let built = self.build_files(touched).await?;

        let mut next = (*current).clone();
        let mut patch = GraphPatch::default();
        for path in changes.deleted {
            next.remove_file(&path);
            patch.removals.push(path);
        }
        for BuiltFile { file, references } in built {
            if file.parse_failed {
                self.counters.parse_failures.fetch_add(1, Ordering::Relaxed);
            }
            patch.upserts.push(references);
            next.insert_file(file);
        }
        let graph_change = next.graph.apply(patch);
        log::debug!(
            "Graph patched: +{} -{} edges, {} files recomputed",
            graph_change.edges_added,
            graph_change.edges_removed,
            graph_change.recomputed
        );
        next.manifest = manifest;

        self.persist_manifest(&next.manifest).await;
        self.publish(next);
        self.indexed.store(true, Ordering::Release);
        self.discard_chunks(superseded).await;
        Ok(summary)
    }

    /// Chunk touched files in parallel and persist their chunks
    async fn build_files(&self, touched: Vec<FileSnapshot>) -> Result<Vec<BuiltFile>> {
        let chunker = Arc::clone(&self.chunker);
        let store = Arc::clone(&self.store);
        let built = self
            .pool
            .map(touched, move |snapshot| {
                let chunker = Arc::clone(&chunker);
                let store = Arc::clone(&store);
                async move {
                    let FileSnapshot { record, bytes } = snapshot;
                    let path = record.path.clone();
                    let built = tokio::task::spawn_blocking(move || {
                        BuiltFile::from_bytes(&chunker, record, &bytes)
                    })
                    .await
                    .map_err(|err| {
                        IndexerError::Other(format!("chunking {path} failed: {err}"))
                    })?;
                    let file = &built.file;
                    let owned: Vec<Chunk> =
                        file.chunks.iter().map(|chunk| Chunk::clone(chunk)).collect();
                    let record = &file.record;
                    if let Err(err) = store.save(&record.path, &record.fingerprint, &owned).await {
                        log::warn!("Failed to store chunks for {}: {err}", file.record.path);
                    }
                    Ok::<_, IndexerError>(built)
                }
            })
            .await?;
        built
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(EngineError::from)
    }

    /// Rebuild the index from the persisted manifest and chunk store.
    ///
    /// Files whose chunks are missing are dropped from the baseline so the
    /// next reconcile treats them as added.
    async fn restore(&self) -> Result<()> {
        let (manifest, recovered) = Manifest::load_or_empty(&self.manifest_path).await;
        if recovered {
            self.counters.manifest_recoveries.fetch_add(1, Ordering::Relaxed);
        }
        if manifest.is_empty() {
            self.collect_store(&IndexSnapshot::default()).await;
            return Ok(());
        }

        let records: Vec<FileRecord> = manifest.records().cloned().collect();
        let store = Arc::clone(&self.store);
        let restored = self
            .pool
            .map(records, move |record| {
                let store = Arc::clone(&store);
                async move {
                    let chunks = store.load(&record.path, &record.fingerprint).await?;
                    tokio::task::spawn_blocking(move || BuiltFile::from_chunks(record, chunks))
                        .await
                        .ok()
                }
            })
            .await?;

        let mut snapshot = IndexSnapshot::default();
        let mut references = Vec::with_capacity(restored.len());
        for BuiltFile { file, references: refs } in restored.into_iter().flatten() {
            snapshot.manifest.insert(file.record.clone());
            references.push(refs);
            snapshot.insert_file(file);
        }
        snapshot.graph = ReferenceGraph::build(references);

        let missing = manifest.len() - snapshot.files.len();
        if missing > 0 {
            log::info!("{missing} manifest entries have no stored chunks; they will be re-indexed");
        }
        self.collect_store(&snapshot).await;
        if !snapshot.files.is_empty() {
            self.indexed.store(true, Ordering::Release);
        }
        self.publish(snapshot);
        Ok(())
    }

    /// Drop stored chunk sets no restored file refers to
    async fn collect_store(&self, snapshot: &IndexSnapshot) {
        let live: HashSet<String> = snapshot
            .files
            .values()
            .map(|file| self.store.key(&file.record.path, &file.record.fingerprint))
            .collect();
        match self.store.retain(&live).await {
            Ok(0) => {}
            Ok(removed) => log::debug!("Removed {removed} stale chunk sets"),
            Err(err) => log::warn!("Failed to clean chunk store: {err}"),
        }
    }

    /// Remove the stored chunks of file versions the index no longer holds
    async fn discard_chunks(&self, superseded: Vec<(String, Fingerprint)>) {
        let mut removed = 0;
        for (path, fingerprint) in superseded {
            match self.store.remove(&path, &fingerprint).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => log::warn!("Failed to remove stale chunks for {path}: {err}"),
            }
        }
        if removed > 0 {
            log::debug!("Removed {removed} superseded chunk sets");
        }
    }

    async fn persist_manifest(&self, manifest: &Manifest) {
        if let Err(err) = manifest.save(&self.manifest_path).await {
            log::warn!(
                "Failed to save manifest {}: {err}; the next session re-reads changed files",
                self.manifest_path.display()
            );
        }
    }
}

async fn canonical_root(path: &Path) -> Result<PathBuf> {
    let invalid = |reason: String| EngineError::InvalidRoot {
        path: path.to_path_buf(),
        reason,
    };
    let root = tokio::fs::canonicalize(path)
        .await
        .map_err(|err| invalid(err.to_string()))?;
    let metadata = tokio::fs::metadata(&root)
        .await
        .map_err(|err| invalid(err.to_string()))?;
    if !metadata.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    let _entries = tokio::fs::read_dir(&root)
        .await
        .map_err(|err| invalid(err.to_string()))?;
    Ok(root)
}

fn chunk_view(chunk: &Chunk) -> ChunkView {
    ChunkView {
        file: chunk.file_path.clone(),
        kind: chunk.kind.as_str().to_string(),
        name: chunk.name.clone(),
        content: chunk.rendered(),
        byte_start: chunk.byte_start,
        byte_end: chunk.byte_end,
        estimated_tokens: chunk.estimated_tokens(),
        fingerprint: chunk.fingerprint,
    }
}

fn build_response(selection: &Selection) -> QueryResponse {
    QueryResponse {
        chunks: selection.chunks.iter().map(|chunk| chunk_view(chunk)).collect(),
        from_cache: false,
        total_tokens: selection.total_tokens,
        token_budget: selection.token_budget,
    }
}

/// Re-home a cached response onto the current selection.
///
/// The cache key covers content only, so the cached views may name a file
/// that has since been renamed. Views are matched back by fingerprint and
/// emitted in the current presentation order; `None` when they disagree.
fn remap_cached(cached: QueryResponse, selection: &Selection) -> Option<QueryResponse> {
    if cached.chunks.len() != selection.chunks.len() {
        return None;
    }
    let mut by_fingerprint: HashMap<Fingerprint, VecDeque<ChunkView>> = HashMap::new();
    for view in cached.chunks {
        by_fingerprint.entry(view.fingerprint).or_default().push_back(view);
    }
    let mut chunks = Vec::with_capacity(selection.chunks.len());
    for chunk in &selection.chunks {
        let mut view = by_fingerprint.get_mut(&chunk.fingerprint)?.pop_front()?;
        view.file.clone_from(&chunk.file_path);
        view.byte_start = chunk.byte_start;
        view.byte_end = chunk.byte_end;
        chunks.push(view);
    }
    Some(QueryResponse {
        chunks,
        from_cache: true,
        total_tokens: selection.total_tokens,
        token_budget: selection.token_budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_chunker::ChunkKind;
    use pretty_assertions::assert_eq;

    fn chunk(path: &str, start: usize, content: &str) -> Arc<Chunk> {
        Arc::new(Chunk::new(path, ChunkKind::Function, Some("f".to_string()), start, content))
    }

    fn selection(chunks: Vec<Arc<Chunk>>) -> Selection {
        let total_tokens = chunks.iter().map(|c| c.estimated_tokens()).sum();
        Selection {
            chunks,
            total_tokens,
            token_budget: 100,
            budget_too_small: false,
            smallest_candidate_tokens: None,
        }
    }

    #[test]
    fn cached_views_follow_renamed_files() {
        let before = selection(vec![chunk("old.py", 0, "def f():\n    pass\n")]);
        let cached = build_response(&before);

        let after = selection(vec![chunk("new.py", 0, "def f():\n    pass\n")]);
        let remapped = remap_cached(cached, &after).unwrap();
        assert!(remapped.from_cache);
        assert_eq!(remapped.chunks[0].file, "new.py");
        assert_eq!(remapped.total_tokens, after.total_tokens);
    }

    #[test]
    fn mismatched_cache_entry_is_rejected() {
        let cached = build_response(&selection(vec![chunk("a.py", 0, "def f():\n    pass\n")]));
        let other = selection(vec![chunk("a.py", 0, "def g():\n    pass\n")]);
        assert!(remap_cached(cached, &other).is_none());
    }

    #[test]
    fn duplicate_content_maps_to_each_file() {
        let body = "def f():\n    pass\n";
        let cached = build_response(&selection(vec![
            chunk("a.py", 0, body),
            chunk("b.py", 0, body),
        ]));
        let current = selection(vec![chunk("a.py", 0, body), chunk("c.py", 0, body)]);
        let files: Vec<String> = remap_cached(cached, &current)
            .unwrap()
            .chunks
            .into_iter()
            .map(|view| view.file)
            .collect();
        assert_eq!(files, vec!["a.py".to_string(), "c.py".to_string()]);
    }
}
