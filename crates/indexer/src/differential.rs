use crate::limits::WorkerPool;
use crate::manifest::{FileRecord, Manifest};
use crate::scanner::{FileScanner, ScannedFile};
use crate::{IndexerError, Result};
use context_code_chunker::Language;
use context_protocol::{ChangeSummary, Fingerprint};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(3_000);

/// Current content of an added or modified file
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    pub record: FileRecord,
    pub bytes: Arc<[u8]>,
}

/// Difference between the manifest and the working tree
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub added: Vec<FileSnapshot>,
    pub modified: Vec<FileSnapshot>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Added and modified files, the ones that need chunking
    pub fn touched(&self) -> impl Iterator<Item = &FileSnapshot> {
        self.added.iter().chain(self.modified.iter())
    }

    pub fn summary(&self) -> ChangeSummary {
        let paths = |files: &[FileSnapshot]| files.iter().map(|f| f.record.path.clone()).collect();
        ChangeSummary {
            added: paths(&self.added),
            modified: paths(&self.modified),
            deleted: self.deleted.clone(),
            unchanged: self.unchanged.len(),
        }
    }
}

/// Result of one reconcile pass; `manifest` is the baseline to persist once
/// the changes have been applied
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub changes: ChangeSet,
    pub manifest: Manifest,
    /// New files that could not be read this pass
    pub skipped: Vec<String>,
}

#[derive(Debug)]
enum FileRead {
    Fresh { record: FileRecord, bytes: Vec<u8> },
    /// Size and mtime match the manifest and mtimes are trusted
    Reused(FileRecord),
}

/// Computes add/modify/delete change sets by fingerprint comparison
#[derive(Debug, Clone)]
pub struct DifferentialUpdater {
    scanner: FileScanner,
    pool: WorkerPool,
    io_timeout: Duration,
    trust_mtime: bool,
}

impl DifferentialUpdater {
    pub fn new(scanner: FileScanner, pool: WorkerPool) -> Self {
        Self {
            scanner,
            pool,
            io_timeout: DEFAULT_IO_TIMEOUT,
            trust_mtime: false,
        }
    }

    #[must_use]
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    #[must_use]
    pub fn trust_mtime(mut self, trust: bool) -> Self {
        self.trust_mtime = trust;
        self
    }

    pub fn scanner(&self) -> &FileScanner {
        &self.scanner
    }

    /// Compare the working tree against `manifest`.
    ///
    /// Pure with respect to `manifest`: nothing is persisted here.
    pub async fn reconcile(&self, manifest: &Manifest) -> Result<Reconciliation> {
        let scanner = self.scanner.clone();
        let files = self.pool.run_blocking(move || scanner.scan()).await?;

        let jobs: Vec<(ScannedFile, Option<FileRecord>)> = files
            .into_iter()
            .map(|file| {
                let prior = manifest.get(&file.relative).cloned();
                (file, prior)
            })
            .collect();
        let (io_timeout, trust_mtime) = (self.io_timeout, self.trust_mtime);
        let reads = self
            .pool
            .map(jobs, move |(file, prior)| async move {
                let outcome = read_file(file.clone(), prior.clone(), trust_mtime, io_timeout).await;
                (file, prior, outcome)
            })
            .await?;

        let reconciliation = classify(manifest, reads);
        let changes = &reconciliation.changes;
        if changes.is_empty() {
            log::debug!("Reconciled {} files, no changes", changes.unchanged.len());
        } else {
            log::info!(
                "Reconciled: {} added, {} modified, {} deleted, {} unchanged",
                changes.added.len(),
                changes.modified.len(),
                changes.deleted.len(),
                changes.unchanged.len()
            );
        }
        Ok(reconciliation)
    }
}

fn classify(
    manifest: &Manifest,
    reads: Vec<(ScannedFile, Option<FileRecord>, Result<FileRead>)>,
) -> Reconciliation {
    let mut next = Manifest::new();
    let mut changes = ChangeSet::default();
    let mut skipped = Vec::new();

    for (file, prior, outcome) in reads {
        match outcome {
            Ok(FileRead::Reused(record)) => {
                changes.unchanged.push(record.path.clone());
                next.insert(record);
            }
            Ok(FileRead::Fresh { record, bytes }) => {
                next.insert(record.clone());
                let snapshot = FileSnapshot {
                    record,
                    bytes: bytes.into(),
                };
                match prior {
                    Some(prior) if prior.fingerprint == snapshot.record.fingerprint => {
                        changes.unchanged.push(snapshot.record.path)
                    }
                    Some(_) => changes.modified.push(snapshot),
                    None => changes.added.push(snapshot),
                }
            }
            // Vanished between scan and read: absent from `next`, so a deletion.
            Err(IndexerError::NotFound(path)) => {
                log::debug!("{} disappeared during reconcile", path.display());
            }
            Err(err) => match prior {
                Some(prior) => {
                    log::warn!("Keeping previous index of {}: {err}", file.relative);
                    changes.unchanged.push(prior.path.clone());
                    next.insert(prior);
                }
                None => {
                    log::warn!("Skipping {} until a later scan: {err}", file.relative);
                    skipped.push(file.relative);
                }
            },
        }
    }

    changes.deleted = manifest
        .entries
        .keys()
        .filter(|path| next.get(path).is_none())
        .cloned()
        .collect();

    Reconciliation {
        changes,
        manifest: next,
        skipped,
    }
}

async fn read_file(
    file: ScannedFile,
    prior: Option<FileRecord>,
    trust_mtime: bool,
    io_timeout: Duration,
) -> Result<FileRead> {
    let path = file.absolute.clone();
    let task =
        tokio::task::spawn_blocking(move || read_blocking(&file, prior.as_ref(), trust_mtime));
    match tokio::time::timeout(io_timeout, task).await {
        Ok(joined) => joined.map_err(|e| IndexerError::Other(format!("read task failed: {e}")))?,
        Err(_) => Err(IndexerError::Timeout {
            path,
            timeout_ms: u64::try_from(io_timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

fn read_blocking(
    file: &ScannedFile,
    prior: Option<&FileRecord>,
    trust_mtime: bool,
) -> Result<FileRead> {
    let meta = std::fs::metadata(&file.absolute)
        .map_err(|e| IndexerError::from_io(&file.absolute, e))?;
    let last_modified_ms = meta.modified().map(unix_ms).unwrap_or(0);
    if trust_mtime && last_modified_ms != 0 {
        if let Some(prior) = prior {
            if prior.size_bytes == meta.len() && prior.last_modified_ms == last_modified_ms {
                return Ok(FileRead::Reused(prior.clone()));
            }
        }
    }

    let bytes =
        std::fs::read(&file.absolute).map_err(|e| IndexerError::from_io(&file.absolute, e))?;
    let record = FileRecord {
        path: file.relative.clone(),
        language: Language::from_path(&file.relative),
        fingerprint: Fingerprint::of(&bytes),
        size_bytes: bytes.len() as u64,
        last_modified_ms,
    };
    Ok(FileRead::Fresh { record, bytes })
}

fn unix_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
