use context_protocol::Fingerprint;
use context_response_cache::{CacheConfig, CacheKey, ResponseCache};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Answer {
    files: Vec<String>,
    tokens: usize,
}

fn answer(n: usize) -> Answer {
    Answer {
        files: vec![format!("src/file_{n}.rs")],
        tokens: n,
    }
}

#[tokio::test]
async fn entries_survive_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let key = CacheKey::new("what does bar do", &[Fingerprint::of("def bar(): ...")]);
    {
        let cache: ResponseCache<Answer> =
            ResponseCache::open(dir.path(), CacheConfig::default()).await;
        cache.put(&key, &answer(1)).await;
    }
    let cache: ResponseCache<Answer> =
        ResponseCache::open(dir.path(), CacheConfig::default()).await;
    assert_eq!(cache.get(&key).await, Some(answer(1)));
    assert_eq!(cache.stats().hits, 1);
    assert_eq!(cache.stats().memory_entries, 1);
}

#[tokio::test]
async fn same_content_under_new_path_shares_the_key() {
    let content = Fingerprint::of("def foo():\n    return 1\n");
    assert_eq!(
        CacheKey::new("foo", &[content]),
        ResponseCache::<Answer>::key("foo", &[content])
    );
    let edited = Fingerprint::of("def foo():\n    return 2\n");
    assert_ne!(CacheKey::new("foo", &[content]), CacheKey::new("foo", &[edited]));
}

#[tokio::test]
async fn disk_tier_stays_under_its_ceiling() {
    let dir = TempDir::new().expect("tempdir");
    let config = CacheConfig {
        max_disk_bytes: 400,
        ..CacheConfig::default()
    };
    let cache: ResponseCache<Answer> = ResponseCache::open(dir.path(), config).await;
    for n in 0..20 {
        let key = CacheKey::new(&format!("query {n}"), &[]);
        cache.put(&key, &answer(n)).await;
    }

    let mut total = 0u64;
    let mut stack = vec![dir.path().to_path_buf()];
    while let Some(path) = stack.pop() {
        for entry in std::fs::read_dir(&path).expect("read dir").flatten() {
            let meta = entry.metadata().expect("metadata");
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    assert!(total <= 400, "disk tier holds {total} bytes");
    assert!(cache.stats().evictions > 0);
}
