//! Background ingestion of sources into the instance store.
//!
//! # Responsibilities
//! - Poll every configured source once per cycle, sequentially
//! - Apply global then per-instance transforms
//! - Publish consistent generations by atomic reference replacement
//!
//! # Design Decisions
//! - A failed cycle leaves the last-good generation in place; retries happen
//!   on the next tick, never mid-cycle
//! - An unchanged raw checksum skips transform and publish work entirely
//! - Readers take one `snapshot()` per request and hold it to the end

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tokio::sync::broadcast;

use crate::config::schema::{AppConfig, TransformFailurePolicy};
use crate::discovery::fingerprint::canonical_hash;
use crate::modifiers::{self, GlobalModifier, Modifier, TransformError};
use crate::observability::{metrics, stats};
use crate::sources::{build_source, Instance, Source, SourceError};

/// `scope → ordered list of instances`.
pub type ScopeMap = HashMap<String, Vec<Instance>>;

/// One immutable generation of the instance store.
pub struct Snapshot {
    /// Monotone generation counter. Zero only for the startup placeholder.
    pub generation: u64,
    /// Content hash of the transformed scopes; folded into fingerprints.
    pub content_id: u64,
    /// Content hash of the raw scopes; used for unchanged detection.
    pub raw_id: u64,
    /// Instances as the sources produced them.
    pub raw: ScopeMap,
    /// Instances after global and per-instance transforms.
    pub scopes: ScopeMap,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            generation: 0,
            content_id: 0,
            raw_id: 0,
            raw: ScopeMap::new(),
            scopes: ScopeMap::new(),
        }
    }

    pub fn instance_count(&self) -> usize {
        self.scopes.values().map(Vec::len).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollerInitError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Transform(#[from] TransformError),
}

pub struct SourcePoller {
    sources: Vec<(String, Box<dyn Source>)>,
    modifiers: Vec<(String, Arc<dyn Modifier>)>,
    global_modifiers: Vec<(String, Arc<dyn GlobalModifier>)>,
    refresh_rate: Duration,
    failure_policy: TransformFailurePolicy,
    failure_threshold: u32,
    snapshot: ArcSwap<Snapshot>,
    generation: AtomicU64,
    consecutive_failures: AtomicU32,
}

impl SourcePoller {
    pub fn new(config: &AppConfig) -> Result<Self, PollerInitError> {
        let mut sources = Vec::with_capacity(config.sources.len());
        for configured in &config.sources {
            sources.push((configured.scope.clone(), build_source(configured)?));
        }
        if sources.is_empty() {
            return Err(SourceError::new("poller", "no data sources configured").into());
        }
        Ok(Self {
            sources,
            modifiers: modifiers::resolve_modifiers(&config.modifiers)?,
            global_modifiers: modifiers::resolve_global_modifiers(&config.global_modifiers)?,
            refresh_rate: Duration::from_secs(config.source_config.refresh_rate),
            failure_policy: config.source_config.transform_failure_policy,
            failure_threshold: config.source_config.poll_failure_threshold,
            snapshot: ArcSwap::from_pointee(Snapshot::empty()),
            generation: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
        })
    }

    /// The current generation. Cheap; callers hold the Arc for the whole
    /// request so every read within it observes the same data.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Blocking first poll. The server must not start serving before this
    /// succeeds.
    pub async fn initial_load(&self) -> Result<(), SourceError> {
        self.poll().await.map(|_| ())
    }

    /// One poll cycle. Returns whether a new generation was published.
    pub async fn poll(&self) -> Result<bool, SourceError> {
        stats::increment("sources.attempt");

        let mut raw = ScopeMap::new();
        for (scope, source) in &self.sources {
            let instances = source.get().await?;
            raw.entry(scope.clone()).or_default().extend(instances);
        }

        let raw_id = hash_scopes(&raw);
        let current = self.snapshot.load();
        if current.generation > 0 && current.raw_id == raw_id {
            stats::increment("sources.unchanged");
            return Ok(false);
        }

        let started = Instant::now();
        let scopes = self.apply_transforms(&raw);
        if !self.modifiers.is_empty() || !self.global_modifiers.is_empty() {
            stats::timed("modifiers.apply_ms", started);
        }

        let content_id = hash_scopes(&scopes);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let next = Snapshot {
            generation,
            content_id,
            raw_id,
            raw,
            scopes,
        };
        let instance_count = next.instance_count();
        self.snapshot.store(Arc::new(next));

        stats::increment("sources.refreshed");
        metrics::record_generation(generation);
        metrics::record_instance_count(instance_count);
        tracing::info!(generation, instance_count, "published new instance generation");
        Ok(true)
    }

    /// Background loop: sleep for `refresh_rate`, re-poll, repeat.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.refresh_rate) => {
                    if let Err(e) = self.poll().await {
                        stats::increment("sources.error");
                        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                        // Two refresh periods without a successful poll means
                        // the published generation is going stale.
                        if failures >= 2 {
                            stats::increment("sources.stale");
                        }
                        if failures >= self.failure_threshold {
                            tracing::error!(
                                error = %e,
                                consecutive_failures = failures,
                                "poll failure circuit tripped; still serving last-good generation"
                            );
                        } else {
                            tracing::warn!(error = %e, "poll cycle failed; retaining last-good generation");
                        }
                    } else {
                        self.consecutive_failures.store(0, Ordering::Relaxed);
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("source poller stopping");
                    break;
                }
            }
        }
    }

    /// Global transforms first (scope-wide), then per-instance ones.
    fn apply_transforms(&self, raw: &ScopeMap) -> ScopeMap {
        let mut result = ScopeMap::new();
        'scopes: for (scope, original) in raw {
            let mut instances = original.clone();

            for (name, global) in &self.global_modifiers {
                match global.apply(std::mem::take(&mut instances)) {
                    Ok(transformed) => instances = transformed,
                    Err(e) => {
                        // A failed scope-wide transform taints the whole scope.
                        tracing::warn!(modifier = %name, scope = %scope, error = %e,
                            "global transform failed; rolling back scope");
                        stats::increment("modifiers.error");
                        result.insert(scope.clone(), original.clone());
                        continue 'scopes;
                    }
                }
            }

            let mut kept = Vec::with_capacity(instances.len());
            for instance in instances {
                match self.apply_instance_modifiers(instance) {
                    Ok(instance) => kept.push(instance),
                    Err(e) => {
                        stats::increment("modifiers.error");
                        match self.failure_policy {
                            TransformFailurePolicy::DropInstance => {
                                tracing::warn!(scope = %scope, error = %e,
                                    "transform failed; dropping instance");
                            }
                            TransformFailurePolicy::RollbackScope => {
                                tracing::warn!(scope = %scope, error = %e,
                                    "transform failed; rolling back scope");
                                result.insert(scope.clone(), original.clone());
                                continue 'scopes;
                            }
                        }
                    }
                }
            }
            result.insert(scope.clone(), kept);
        }
        result
    }

    fn apply_instance_modifiers(&self, mut instance: Instance) -> Result<Instance, TransformError> {
        for (_, modifier) in &self.modifiers {
            if modifier.matches(&instance) {
                instance = modifier.apply(instance)?;
            }
        }
        Ok(instance)
    }
}

fn hash_scopes(scopes: &ScopeMap) -> u64 {
    let doc = serde_json::Value::Object(
        scopes
            .iter()
            .map(|(scope, instances)| {
                let items = instances
                    .iter()
                    .map(|i| serde_json::Value::Object(i.clone()))
                    .collect();
                (scope.clone(), serde_json::Value::Array(items))
            })
            .collect(),
    );
    canonical_hash(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ConfiguredSource;

    fn config_with_instances(instances: serde_json::Value) -> AppConfig {
        let mut config = AppConfig::default();
        config.sources.push(ConfiguredSource {
            source_type: "inline".into(),
            scope: "default".into(),
            config: serde_json::json!({ "instances": instances }),
        });
        config
    }

    #[tokio::test]
    async fn initial_load_publishes_generation_one() {
        let poller = SourcePoller::new(&config_with_instances(
            serde_json::json!([{"name": "a"}]),
        ))
        .unwrap();
        poller.initial_load().await.unwrap();
        let snap = poller.snapshot();
        assert_eq!(snap.generation, 1);
        assert_eq!(snap.instance_count(), 1);
    }

    #[tokio::test]
    async fn unchanged_data_does_not_publish() {
        let poller = SourcePoller::new(&config_with_instances(
            serde_json::json!([{"name": "a"}]),
        ))
        .unwrap();
        assert!(poller.poll().await.unwrap());
        let first = poller.snapshot();
        assert!(!poller.poll().await.unwrap());
        let second = poller.snapshot();
        assert_eq!(first.generation, second.generation);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn generations_are_monotone() {
        let poller = SourcePoller::new(&config_with_instances(
            serde_json::json!([{"name": "a"}]),
        ))
        .unwrap();
        let mut last = poller.snapshot().generation;
        for _ in 0..3 {
            poller.poll().await.unwrap();
            let current = poller.snapshot().generation;
            assert!(current >= last);
            last = current;
        }
    }

    #[tokio::test]
    async fn failed_source_keeps_last_good_generation() {
        let mut config = config_with_instances(serde_json::json!([{"name": "a"}]));
        config.sources.push(ConfiguredSource {
            source_type: "file".into(),
            scope: "default".into(),
            config: serde_json::json!({"path": "file:///nonexistent/path.yaml"}),
        });
        let poller = SourcePoller::new(&config).unwrap();
        assert!(poller.poll().await.is_err());
        assert_eq!(poller.snapshot().generation, 0);
    }

    #[tokio::test]
    async fn scoped_sources_merge_in_order() {
        let mut config = config_with_instances(serde_json::json!([{"name": "a"}]));
        config.sources.push(ConfiguredSource {
            source_type: "inline".into(),
            scope: "clusters".into(),
            config: serde_json::json!({"instances": [{"name": "b"}, {"name": "c"}]}),
        });
        let poller = SourcePoller::new(&config).unwrap();
        poller.poll().await.unwrap();
        let snap = poller.snapshot();
        assert_eq!(snap.scopes["default"].len(), 1);
        let names: Vec<&str> = snap.scopes["clusters"]
            .iter()
            .map(|i| i["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["b", "c"]);
    }
}
