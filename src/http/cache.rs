//! Static-content cache boundary. This crate only defines the
//! trait consulted by a GET-serving handler and a trivial in-memory
//! implementation suitable for tests; population/refresh/disk-loading are
//! out of scope.

use std::collections::HashMap;
use std::sync::RwLock;

/// Maps a URL path (without query string) to a fully pre-built response
/// byte slice.
pub trait StaticContentCache: Send + Sync {
    fn find(&self, path: &str) -> Option<Vec<u8>>;
}

/// Trivial in-memory cache: a fixed map populated up front, consulted
/// read-only afterwards.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.write().unwrap().insert(path.into(), bytes.into());
    }
}

impl StaticContentCache for InMemoryCache {
    fn find(&self, path: &str) -> Option<Vec<u8>> {
        self.entries.read().unwrap().get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_returns_bytes_miss_returns_none() {
        let cache = InMemoryCache::new();
        cache.insert("/index.html", b"hello".to_vec());
        assert_eq!(cache.find("/index.html"), Some(b"hello".to_vec()));
        assert_eq!(cache.find("/missing"), None);
    }
}
