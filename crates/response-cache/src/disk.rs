use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

#[derive(Serialize, Deserialize, Debug)]
pub(crate) struct CacheEnvelope<T> {
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub data: T,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    expires_at_ms: u64,
}

/// Sharded JSON files under the cache directory, one per key
#[derive(Debug, Clone)]
pub(crate) struct DiskTier {
    dir: PathBuf,
    io_timeout: Duration,
}

impl DiskTier {
    pub async fn open(dir: PathBuf, io_timeout: Duration) -> Result<Self> {
        let tier = Self { dir, io_timeout };
        let dir = tier.dir.clone();
        tier.bounded("open", tokio::fs::create_dir_all(&dir)).await?;
        Ok(tier)
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let hex = key.to_hex();
        let (shard_a, shard_b) = shard_dirs(&hex);
        self.dir
            .join(shard_a)
            .join(shard_b)
            .join(format!("{hex}.json"))
    }

    pub async fn read<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> Result<Option<CacheEnvelope<T>>> {
        let path = self.entry_path(key);
        let bytes = match tokio::time::timeout(self.io_timeout, tokio::fs::read(&path)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(self.timeout("read")),
        };
        match serde_json::from_slice(&bytes) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(err) => {
                let _ = tokio::fs::remove_file(&path).await;
                Err(err.into())
            }
        }
    }

    /// Store `bytes` for `key`; returns the size of the entry it replaced
    pub async fn write(&self, key: &CacheKey, bytes: Vec<u8>) -> Result<u64> {
        let path = self.entry_path(key);
        self.bounded("write", async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let replaced = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata.len(),
                Err(_) => 0,
            };
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, &bytes).await?;
            if let Err(err) = tokio::fs::rename(&tmp, &path).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(err);
            }
            Ok(replaced)
        })
        .await
    }

    /// Delete the entry for `key`; returns its size, `None` when absent
    pub async fn remove(&self, key: &CacheKey) -> Result<Option<u64>> {
        let path = self.entry_path(key);
        let removal = async {
            let len = tokio::fs::metadata(&path).await?.len();
            tokio::fs::remove_file(&path).await?;
            Ok::<_, std::io::Error>(len)
        };
        match tokio::time::timeout(self.io_timeout, removal).await {
            Ok(Ok(len)) => Ok(Some(len)),
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(self.timeout("remove")),
        }
    }

    /// Mark an entry as recently used for pruning purposes
    pub async fn touch(&self, key: &CacheKey) -> Result<()> {
        let path = self.entry_path(key);
        self.blocking("touch", move || {
            std::fs::File::options()
                .write(true)
                .open(&path)?
                .set_modified(SystemTime::now())
        })
        .await?
        .map_err(Into::into)
    }

    /// Total bytes currently stored
    pub async fn usage(&self) -> Result<u64> {
        let dir = self.dir.clone();
        self.blocking("usage", move || {
            let mut files = Vec::new();
            let mut total = 0;
            collect_files(&dir, &mut files, &mut total);
            total
        })
        .await
    }

    /// Delete least recently used entries until at most `max_bytes` remain.
    /// Returns the remaining usage and the number of removed entries.
    pub async fn prune(&self, max_bytes: u64) -> Result<(u64, usize)> {
        let dir = self.dir.clone();
        self.blocking("prune", move || prune_dir(&dir, max_bytes)).await
    }

    /// Delete every entry that expired before `now_ms`
    pub async fn purge_expired(&self, now_ms: u64) -> Result<usize> {
        let dir = self.dir.clone();
        self.blocking("purge", move || {
            let mut files = Vec::new();
            let mut total = 0;
            collect_files(&dir, &mut files, &mut total);
            let mut removed = 0;
            for file in files {
                let expired = std::fs::read(&file.path)
                    .ok()
                    .and_then(|bytes| serde_json::from_slice::<EnvelopeHeader>(&bytes).ok())
                    .map_or(true, |header| header.expires_at_ms <= now_ms);
                if expired && std::fs::remove_file(&file.path).is_ok() {
                    removed += 1;
                }
            }
            removed
        })
        .await
    }

    async fn bounded<F, R>(&self, op: &'static str, fut: F) -> Result<R>
    where
        F: Future<Output = std::io::Result<R>>,
    {
        match tokio::time::timeout(self.io_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(self.timeout(op)),
        }
    }

    async fn blocking<F, R>(&self, op: &'static str, work: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        match tokio::time::timeout(self.io_timeout, tokio::task::spawn_blocking(work)).await {
            Ok(joined) => joined.map_err(|e| CacheError::Worker(e.to_string())),
            Err(_) => Err(self.timeout(op)),
        }
    }

    fn timeout(&self, op: &'static str) -> CacheError {
        CacheError::Timeout {
            op,
            timeout_ms: u64::try_from(self.io_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

fn shard_dirs(hex: &str) -> (&str, &str) {
    (hex.get(0..2).unwrap_or("00"), hex.get(2..4).unwrap_or("00"))
}

fn prune_dir(root: &Path, max_bytes: u64) -> (u64, usize) {
    let mut files = Vec::new();
    let mut total = 0u64;
    collect_files(root, &mut files, &mut total);
    if total <= max_bytes {
        return (total, 0);
    }
    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    let mut removed = 0;
    for file in files {
        if total <= max_bytes {
            break;
        }
        if std::fs::remove_file(&file.path).is_ok() {
            total = total.saturating_sub(file.len);
            removed += 1;
        }
    }
    (total, removed)
}

struct FileEntry {
    path: PathBuf,
    len: u64,
    modified: SystemTime,
}

fn collect_files(root: &Path, out: &mut Vec<FileEntry>, total: &mut u64) {
    let Ok(read_dir) = std::fs::read_dir(root) else {
        return;
    };
    for entry in read_dir.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_dir() {
            collect_files(&path, out, total);
            continue;
        }
        let len = meta.len();
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        *total = total.saturating_add(len);
        out.push(FileEntry {
            path,
            len,
            modified,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_protocol::Fingerprint;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn key(q: &str) -> CacheKey {
        CacheKey::new(q, &[Fingerprint::of(q)])
    }

    fn envelope(data: &str, expires_at_ms: u64) -> Vec<u8> {
        serde_json::to_vec(&CacheEnvelope {
            created_at_ms: 0,
            expires_at_ms,
            data,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn entries_are_sharded_by_key() {
        let dir = tempdir().unwrap();
        let tier = DiskTier::open(dir.path().to_path_buf(), Duration::from_secs(1))
            .await
            .unwrap();
        let k = key("q");
        let hex = k.to_hex();
        let path = tier.entry_path(&k);
        assert!(path.ends_with(format!("{}/{}/{hex}.json", &hex[0..2], &hex[2..4])));

        let first = envelope("hello", 10);
        let first_len = first.len() as u64;
        assert_eq!(tier.write(&k, first).await.unwrap(), 0);
        let read: CacheEnvelope<String> = tier.read(&k).await.unwrap().unwrap();
        assert_eq!(read.data, "hello");
        let second = envelope("hello again", 10);
        let second_len = second.len() as u64;
        assert_eq!(tier.write(&k, second).await.unwrap(), first_len);
        assert_eq!(tier.remove(&k).await.unwrap(), Some(second_len));
        assert_eq!(tier.remove(&k).await.unwrap(), None);
        assert!(tier.read::<String>(&k).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_entries_error_and_are_removed() {
        let dir = tempdir().unwrap();
        let tier = DiskTier::open(dir.path().to_path_buf(), Duration::from_secs(1))
            .await
            .unwrap();
        let k = key("q");
        tier.write(&k, b"{ nope".to_vec()).await.unwrap();
        assert!(tier.read::<String>(&k).await.is_err());
        assert!(!tier.entry_path(&k).exists());
    }

    #[tokio::test]
    async fn prune_and_purge() {
        let dir = tempdir().unwrap();
        let tier = DiskTier::open(dir.path().to_path_buf(), Duration::from_secs(1))
            .await
            .unwrap();
        for (q, expires) in [("a", 10), ("b", 10), ("c", 1_000)] {
            tier.write(&key(q), envelope(q, expires)).await.unwrap();
        }
        let usage = tier.usage().await.unwrap();
        assert!(usage > 0);

        assert_eq!(tier.purge_expired(500).await.unwrap(), 2);
        assert!(tier.read::<String>(&key("c")).await.unwrap().is_some());

        let (remaining, removed) = tier.prune(0).await.unwrap();
        assert_eq!((remaining, removed), (0, 1));
    }
}
