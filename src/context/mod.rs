//! Template context: named values supplied to every template invocation.
//!
//! # Responsibilities
//! - Materialize every configured entry at startup
//! - Re-materialize entries on a fixed interval or cron schedule
//! - Retain the prior value when a refresh exhausts its retries
//!
//! # Design Decisions
//! - Values are published by atomic replacement; a request captures one
//!   value per entry at start and never observes a mid-request change
//! - A missing value at startup is fatal; a missing value later is
//!   impossible by construction

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::config::loader::{LoadError, Loadable};
use crate::config::schema::ContextConfig;
use crate::config::validation::parse_cron;
use crate::observability::stats;
use crate::resilience::backoff::calculate_backoff;

struct ContextEntry {
    loadable: Loadable,
    value: ArcSwap<Value>,
}

pub struct TemplateContext {
    entries: BTreeMap<String, ContextEntry>,
    refresh_enabled: bool,
    refresh_rate: Option<u64>,
    refresh_cron: Option<String>,
    num_retries: u32,
    retry_interval_ms: u64,
}

impl TemplateContext {
    /// Load every configured entry. Any failure here fails startup: serving
    /// without a configured context value would render wrong configuration.
    pub async fn from_config(config: &ContextConfig) -> Result<Self, LoadError> {
        let mut entries = BTreeMap::new();
        for (name, loadable) in &config.context {
            let value = materialize(loadable).await?;
            entries.insert(
                name.clone(),
                ContextEntry {
                    loadable: loadable.clone(),
                    value: ArcSwap::from_pointee(value),
                },
            );
        }
        Ok(Self {
            entries,
            refresh_enabled: config.refresh,
            refresh_rate: config.refresh_rate,
            refresh_cron: config.refresh_cron.clone(),
            num_retries: config.refresh_num_retries,
            retry_interval_ms: config.refresh_retry_interval_secs * 1000,
        })
    }

    /// Capture the current value of every entry. Requests call this once.
    pub fn current(&self) -> BTreeMap<String, Arc<Value>> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.value.load_full()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Value>> {
        self.entries.get(name).map(|entry| entry.value.load_full())
    }

    /// Re-materialize a single entry with bounded retries and backoff.
    /// On exhaustion the prior value is retained.
    pub async fn refresh(&self, name: &str) -> Result<(), LoadError> {
        let Some(entry) = self.entries.get(name) else {
            return Err(LoadError::BadLocation(format!(
                "no context entry named {name:?}"
            )));
        };
        let mut attempt = 0u32;
        loop {
            match materialize(&entry.loadable).await {
                Ok(value) => {
                    entry.value.store(Arc::new(value));
                    stats::increment("context.refresh.success");
                    return Ok(());
                }
                Err(e) if attempt < self.num_retries => {
                    attempt += 1;
                    let delay =
                        calculate_backoff(attempt, self.retry_interval_ms, self.retry_interval_ms * 8);
                    tracing::warn!(entry = %name, error = %e, attempt, "context refresh failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    stats::increment("context.refresh.error");
                    tracing::warn!(entry = %name, error = %e,
                        "context refresh exhausted retries; retaining prior value");
                    return Err(e);
                }
            }
        }
    }

    async fn refresh_all(&self) {
        for name in self.entries.keys() {
            // Failures keep the prior value; nothing to do here.
            let _ = self.refresh(name).await;
        }
    }

    /// Background loop driving the configured schedule.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.refresh_enabled || self.entries.is_empty() {
            return;
        }
        loop {
            let delay = match self.next_delay() {
                Some(delay) => delay,
                None => return,
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => self.refresh_all().await,
                _ = shutdown.recv() => {
                    tracing::info!("context refresher stopping");
                    return;
                }
            }
        }
    }

    fn next_delay(&self) -> Option<std::time::Duration> {
        if let Some(expr) = &self.refresh_cron {
            let schedule = parse_cron(expr).ok()?;
            let next = schedule.upcoming(chrono::Utc).next()?;
            let wait = (next - chrono::Utc::now()).to_std().ok()?;
            return Some(wait);
        }
        // One hour is the historical default when refresh is on but no
        // schedule was given.
        Some(std::time::Duration::from_secs(self.refresh_rate.unwrap_or(3600)))
    }
}

async fn materialize(loadable: &Loadable) -> Result<Value, LoadError> {
    match loadable.load().await? {
        crate::config::loader::LoadedValue::Structured(v) => Ok(v),
        crate::config::loader::LoadedValue::Text(s) => Ok(Value::String(s)),
        crate::config::loader::LoadedValue::Bytes(b) => {
            Ok(Value::String(String::from_utf8_lossy(&b).into_owned()))
        }
    }
}
