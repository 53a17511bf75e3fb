use crate::{IndexerError, Result};
use context_code_chunker::Language;
use context_protocol::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// One indexed file: the unit of change detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub language: Language,
    pub fingerprint: Fingerprint,
    pub size_bytes: u64,
    pub last_modified_ms: u64,
}

/// Persisted `path -> fingerprint` baseline for differential reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    #[serde(default)]
    pub entries: BTreeMap<String, FileRecord>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, record: FileRecord) {
        self.entries.insert(record.path.clone(), record);
    }

    pub fn remove(&mut self, path: &str) -> Option<FileRecord> {
        self.entries.remove(path)
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.entries.values()
    }

    /// Read a persisted manifest; `Ok(None)` when none exists yet
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let manifest: Self = serde_json::from_slice(&bytes)
            .map_err(|e| IndexerError::ManifestCorrupt(format!("{}: {e}", path.display())))?;
        if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(IndexerError::ManifestCorrupt(format!(
                "{}: unsupported schema version {}",
                path.display(),
                manifest.schema_version
            )));
        }
        for (key, record) in &manifest.entries {
            if key != &record.path {
                return Err(IndexerError::ManifestCorrupt(format!(
                    "{}: entry {key} records path {}",
                    path.display(),
                    record.path
                )));
            }
        }
        Ok(Some(manifest))
    }

    /// Load the manifest, treating anything unreadable as empty.
    ///
    /// The returned flag is `true` when a corrupt manifest was discarded.
    pub async fn load_or_empty(path: &Path) -> (Self, bool) {
        match Self::load(path).await {
            Ok(Some(manifest)) => (manifest, false),
            Ok(None) => (Self::new(), false),
            Err(err) => {
                log::warn!("Discarding manifest, full re-index follows: {err}");
                (Self::new(), true)
            }
        }
    }

    /// Atomically replace the manifest at `path` (write temp file, rename)
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn record(path: &str, content: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            language: Language::from_path(path),
            fingerprint: Fingerprint::of(content),
            size_bytes: content.len() as u64,
            last_modified_ms: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join(MANIFEST_FILE_NAME);
        let mut manifest = Manifest::new();
        manifest.insert(record("a.py", "import os\n"));
        manifest.insert(record("src/lib.rs", "fn f() {}\n"));
        manifest.save(&path).await.unwrap();

        let loaded = Manifest::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded, manifest);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_manifest_is_empty_not_corrupt() {
        let dir = tempdir().unwrap();
        let (manifest, recovered) = Manifest::load_or_empty(&dir.path().join("none.json")).await;
        assert!(manifest.is_empty());
        assert!(!recovered);
    }

    #[tokio::test]
    async fn corrupt_manifest_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE_NAME);
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        assert!(matches!(
            Manifest::load(&path).await,
            Err(IndexerError::ManifestCorrupt(_))
        ));
        let (manifest, recovered) = Manifest::load_or_empty(&path).await;
        assert!(manifest.is_empty());
        assert!(recovered);
    }

    #[tokio::test]
    async fn rejects_unknown_schema_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE_NAME);
        tokio::fs::write(&path, br#"{"schema_version":99,"entries":{}}"#)
            .await
            .unwrap();
        assert!(matches!(
            Manifest::load(&path).await,
            Err(IndexerError::ManifestCorrupt(_))
        ));
    }
}
