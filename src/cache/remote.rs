//! Remote cache tier: a shared key/value store with server-side TTL.
//!
//! Every operation runs under its own short deadline. Overruns and errors
//! downgrade the request to local-only; they never fail discovery.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::config::schema::RemoteCacheConfig;

const KEY_PREFIX: &str = "regency:discovery:";

pub struct RemoteCache {
    manager: ConnectionManager,
    ttl_secs: u64,
    op_timeout: Duration,
}

impl RemoteCache {
    pub async fn connect(
        config: &RemoteCacheConfig,
        ttl_secs: u64,
    ) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(config.url())?;
        let manager = tokio::time::timeout(
            Duration::from_millis(config.op_timeout_ms.max(1000) * 4),
            client.get_connection_manager(),
        )
        .await
        .map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::IoError, "connection timed out"))
        })??;
        tracing::info!(host = %config.host, port = config.port, "remote discovery cache connected");
        Ok(Self {
            manager,
            ttl_secs,
            op_timeout: Duration::from_millis(config.op_timeout_ms),
        })
    }

    pub async fn get(&self, fingerprint: &str) -> Option<super::CachedResponse> {
        let mut conn = self.manager.clone();
        let key = format!("{KEY_PREFIX}{fingerprint}");
        let result: Result<Option<String>, _> =
            match tokio::time::timeout(self.op_timeout, conn.get(&key)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("remote cache read timed out");
                    return None;
                }
            };
        match result {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(response) => Some(response),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding undecodable remote cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "remote cache read failed");
                None
            }
        }
    }

    pub async fn put(&self, fingerprint: &str, response: &super::CachedResponse) {
        let Ok(raw) = serde_json::to_string(response) else {
            return;
        };
        let mut conn = self.manager.clone();
        let key = format!("{KEY_PREFIX}{fingerprint}");
        let write: Result<Result<(), _>, _> = tokio::time::timeout(
            self.op_timeout,
            conn.set_ex(&key, raw, self.ttl_secs),
        )
        .await;
        match write {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "remote cache write failed"),
            Err(_) => tracing::warn!("remote cache write timed out"),
        }
    }
}
