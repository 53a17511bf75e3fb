use context_protocol::Fingerprint;
use std::fmt;

/// Fingerprint of `query ‖ sorted(chunk fingerprints)`.
///
/// Built from chunk content hashes rather than ids, so renaming a file with
/// identical content still hits and editing content under the same path
/// misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(Fingerprint);

impl CacheKey {
    pub fn new(query: &str, chunk_fingerprints: &[Fingerprint]) -> Self {
        let mut sorted = chunk_fingerprints.to_vec();
        sorted.sort_unstable();
        let parts = std::iter::once(query.as_bytes())
            .chain(sorted.iter().map(|fp| fp.as_bytes().as_slice()));
        Self(Fingerprint::of_parts(parts))
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_order_does_not_matter() {
        let (a, b) = (Fingerprint::of("a"), Fingerprint::of("b"));
        assert_eq!(CacheKey::new("q", &[a, b]), CacheKey::new("q", &[b, a]));
    }

    #[test]
    fn query_and_content_both_count() {
        let (a, b) = (Fingerprint::of("a"), Fingerprint::of("b"));
        assert_ne!(CacheKey::new("q", &[a]), CacheKey::new("other", &[a]));
        assert_ne!(CacheKey::new("q", &[a]), CacheKey::new("q", &[b]));
        assert_ne!(CacheKey::new("q", &[a]), CacheKey::new("q", &[a, b]));
        assert_ne!(CacheKey::new("q", &[]), CacheKey::new("", &[]));
    }
}
