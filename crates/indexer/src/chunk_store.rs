use crate::Result;
use context_code_chunker::Chunk;
use context_protocol::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const CHUNK_STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredChunks {
    schema_version: u32,
    path: String,
    fingerprint: Fingerprint,
    signature: String,
    chunks: Vec<Chunk>,
}

/// Persisted chunk sets keyed by `(path, file fingerprint, chunker settings)`.
///
/// Lets a reopened session reuse the chunking of unchanged files. Every
/// failure is soft: a missing or unreadable entry simply means the file is
/// chunked again.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    dir: PathBuf,
    signature: String,
}

impl ChunkStore {
    /// `signature` identifies the chunker settings the stored chunks were
    /// produced with; entries written under another signature never match.
    pub async fn open(dir: impl Into<PathBuf>, signature: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            signature: signature.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key(&self, path: &str, fingerprint: &Fingerprint) -> String {
        let hex = fingerprint.to_hex();
        Fingerprint::of_parts([path, hex.as_str(), self.signature.as_str()]).to_hex()
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(&key[..2]).join(format!("{key}.json"))
    }

    pub async fn load(&self, path: &str, fingerprint: &Fingerprint) -> Option<Vec<Chunk>> {
        let entry = self.entry_path(&self.key(path, fingerprint));
        let bytes = match tokio::fs::read(&entry).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                log::warn!("Failed to read stored chunks {}: {err}", entry.display());
                return None;
            }
        };
        let stored: StoredChunks = match serde_json::from_slice(&bytes) {
            Ok(stored) => stored,
            Err(err) => {
                log::warn!("Ignoring corrupt stored chunks {}: {err}", entry.display());
                return None;
            }
        };
        let matches = stored.schema_version == CHUNK_STORE_SCHEMA_VERSION
            && stored.path == path
            && &stored.fingerprint == fingerprint
            && stored.signature == self.signature;
        matches.then_some(stored.chunks)
    }

    pub async fn save(
        &self,
        path: &str,
        fingerprint: &Fingerprint,
        chunks: &[Chunk],
    ) -> Result<()> {
        let entry = self.entry_path(&self.key(path, fingerprint));
        if let Some(parent) = entry.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let stored = StoredChunks {
            schema_version: CHUNK_STORE_SCHEMA_VERSION,
            path: path.to_string(),
            fingerprint: *fingerprint,
            signature: self.signature.clone(),
            chunks: chunks.to_vec(),
        };
        let bytes = serde_json::to_vec(&stored)?;
        let tmp = entry.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &entry).await?;
        Ok(())
    }

    /// Delete the entry for `(path, fingerprint)`; `false` when there was none
    pub async fn remove(&self, path: &str, fingerprint: &Fingerprint) -> Result<bool> {
        let entry = self.entry_path(&self.key(path, fingerprint));
        match tokio::fs::remove_file(&entry).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete every entry whose key is not in `live`; returns how many were removed
    pub async fn retain(&self, live: &HashSet<String>) -> Result<usize> {
        let mut removed = 0;
        let mut shards = tokio::fs::read_dir(&self.dir).await?;
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = tokio::fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let keep = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .and_then(|name| name.strip_suffix(".json"))
                    .is_some_and(|key| live.contains(key));
                if keep {
                    continue;
                }
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(err) => {
                        log::warn!("Failed to remove stale chunks {}: {err}", path.display())
                    }
                }
            }
        }
        if removed > 0 {
            log::debug!("Removed {removed} unreferenced chunk sets");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_code_chunker::ChunkKind;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn chunks(path: &str) -> Vec<Chunk> {
        vec![
            Chunk::new(path, ChunkKind::Imports, None, 0, "import os\n"),
            Chunk::new(path, ChunkKind::Function, Some("f".into()), 10, "def f(): pass\n"),
        ]
    }

    #[tokio::test]
    async fn stores_and_reloads_by_content() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path().join("chunks"), "v1").await.unwrap();
        let fp = Fingerprint::of("import os\ndef f(): pass\n");
        store.save("a.py", &fp, &chunks("a.py")).await.unwrap();

        assert_eq!(store.load("a.py", &fp).await, Some(chunks("a.py")));
        assert_eq!(store.load("b.py", &fp).await, None);
        assert_eq!(store.load("a.py", &Fingerprint::of("other")).await, None);

        let other_settings = ChunkStore::open(dir.path().join("chunks"), "v2").await.unwrap();
        assert_eq!(other_settings.load("a.py", &fp).await, None);
    }

    #[tokio::test]
    async fn corrupt_entries_read_as_missing() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path(), "v1").await.unwrap();
        let fp = Fingerprint::of("x");
        store.save("a.py", &fp, &chunks("a.py")).await.unwrap();
        let key = store.key("a.py", &fp);
        tokio::fs::write(store.entry_path(&key), b"garbage").await.unwrap();
        assert_eq!(store.load("a.py", &fp).await, None);
    }

    #[tokio::test]
    async fn retain_removes_unreferenced_entries() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path(), "v1").await.unwrap();
        let (fa, fb) = (Fingerprint::of("a"), Fingerprint::of("b"));
        store.save("a.py", &fa, &chunks("a.py")).await.unwrap();
        store.save("b.py", &fb, &chunks("b.py")).await.unwrap();

        let live: HashSet<String> = [store.key("a.py", &fa)].into_iter().collect();
        assert_eq!(store.retain(&live).await.unwrap(), 1);
        assert!(store.load("a.py", &fa).await.is_some());
        assert!(store.load("b.py", &fb).await.is_none());
    }

    #[tokio::test]
    async fn remove_deletes_one_version() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::open(dir.path(), "v1").await.unwrap();
        let (old, new) = (Fingerprint::of("old"), Fingerprint::of("new"));
        store.save("a.py", &old, &chunks("a.py")).await.unwrap();
        store.save("a.py", &new, &chunks("a.py")).await.unwrap();

        assert!(store.remove("a.py", &old).await.unwrap());
        assert!(!store.remove("a.py", &old).await.unwrap());
        assert!(store.load("a.py", &old).await.is_none());
        assert!(store.load("a.py", &new).await.is_some());
    }
}
