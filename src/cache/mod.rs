//! Two-tier discovery response cache.
//!
//! # Data Flow
//! ```text
//! fingerprint → local tier (in-process LRU, TTL)
//!             → remote tier (shared key/value store, TTL) on local miss
//!             → miss: engine renders, then put() fills both tiers
//! ```
//!
//! # Design Decisions
//! - Entries are fully-serialized bodies, never mutated after insert
//! - The fingerprint is total over every response-influencing input, so a
//!   hit is semantically equivalent to a fresh render
//! - Remote failures log and downgrade the request to local-only

pub mod local;
pub mod remote;

use std::sync::Arc;

use crate::config::schema::CacheConfig;
use crate::observability::stats;

/// A serialized discovery response, ready to write to the wire.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CachedResponse {
    pub version_info: String,
    pub body: String,
    pub resource_count: usize,
}

pub struct DiscoveryCache {
    enabled: bool,
    local: local::LocalCache,
    remote: Option<remote::RemoteCache>,
}

impl DiscoveryCache {
    /// Build both tiers. An unreachable remote store degrades to
    /// local-only with a warning; it never fails startup.
    pub async fn from_config(config: &CacheConfig) -> Self {
        let remote = if config.enabled {
            match &config.remote {
                Some(remote_config) => remote::RemoteCache::connect(remote_config, config.ttl_secs)
                    .await
                    .map_err(|e| {
                        tracing::warn!(error = %e, "remote cache unavailable; running local-only");
                    })
                    .ok(),
                None => None,
            }
        } else {
            None
        };
        Self {
            enabled: config.enabled,
            local: local::LocalCache::new(config.local_max_entries, config.ttl_secs),
            remote,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            local: local::LocalCache::new(0, 0),
            remote: None,
        }
    }

    pub async fn get(&self, fingerprint: &str) -> Option<Arc<CachedResponse>> {
        if !self.enabled {
            return None;
        }
        if let Some(hit) = self.local.get(fingerprint) {
            stats::increment("cache.hit");
            return Some(hit);
        }
        if let Some(remote) = &self.remote {
            if let Some(response) = remote.get(fingerprint).await {
                stats::increment("cache.remote.hit");
                let response = Arc::new(response);
                // fill the local tier so the next request short-circuits
                self.local.put(fingerprint, response.clone());
                return Some(response);
            }
        }
        stats::increment("cache.miss");
        None
    }

    /// Best-effort on the remote tier; failures are logged, never surfaced.
    pub async fn put(&self, fingerprint: &str, response: Arc<CachedResponse>) {
        if !self.enabled {
            return;
        }
        self.local.put(fingerprint, response.clone());
        if let Some(remote) = &self.remote {
            remote.put(fingerprint, &response).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(version: &str) -> Arc<CachedResponse> {
        Arc::new(CachedResponse {
            version_info: version.to_string(),
            body: format!("{{\"version_info\":\"{version}\",\"resources\":[]}}"),
            resource_count: 0,
        })
    }

    #[tokio::test]
    async fn round_trip_through_local_tier() {
        let cache = DiscoveryCache::from_config(&CacheConfig::default()).await;
        assert!(cache.get("abc").await.is_none());
        cache.put("abc", response("abc")).await;
        let hit = cache.get("abc").await.unwrap();
        assert_eq!(hit.version_info, "abc");
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let cache = DiscoveryCache::disabled();
        cache.put("abc", response("abc")).await;
        assert!(cache.get("abc").await.is_none());
    }

    #[tokio::test]
    async fn hits_return_what_was_written() {
        let cache = DiscoveryCache::from_config(&CacheConfig::default()).await;
        cache.put("k1", response("v1")).await;
        cache.put("k2", response("v2")).await;
        assert_eq!(cache.get("k1").await.unwrap().version_info, "v1");
        assert_eq!(cache.get("k2").await.unwrap().version_info, "v2");
    }
}
