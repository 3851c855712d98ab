//! In-process cache tier: LRU bounded by entry count, TTL bounded by time.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use super::CachedResponse;

pub struct LocalCache {
    inner: Cache<String, Arc<CachedResponse>>,
}

impl LocalCache {
    pub fn new(max_entries: u64, ttl_secs: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs.max(1)))
            .build();
        Self { inner }
    }

    pub fn get(&self, fingerprint: &str) -> Option<Arc<CachedResponse>> {
        self.inner.get(fingerprint)
    }

    pub fn put(&self, fingerprint: &str, response: Arc<CachedResponse>) {
        self.inner.insert(fingerprint.to_string(), response);
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(version: &str) -> Arc<CachedResponse> {
        Arc::new(CachedResponse {
            version_info: version.to_string(),
            body: String::new(),
            resource_count: 0,
        })
    }

    #[test]
    fn capacity_zero_stores_nothing() {
        let cache = LocalCache::new(0, 60);
        cache.put("a", response("a"));
        cache.inner.run_pending_tasks();
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn stores_and_returns_entries() {
        let cache = LocalCache::new(16, 60);
        cache.put("a", response("a"));
        assert_eq!(cache.get("a").unwrap().version_info, "a");
    }
}
