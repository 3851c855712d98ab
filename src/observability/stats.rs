//! Named counter registry.
//!
//! Counters land in two places: the `metrics` facade for scraping, and an
//! in-process map that the admin surface can serve directly.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use dashmap::DashMap;

fn counters() -> &'static DashMap<&'static str, AtomicU64> {
    static COUNTERS: OnceLock<DashMap<&'static str, AtomicU64>> = OnceLock::new();
    COUNTERS.get_or_init(DashMap::new)
}

/// Increment a named counter.
pub fn increment(name: &'static str) {
    counters()
        .entry(name)
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(1, Ordering::Relaxed);
    metrics::counter!(name).increment(1);
}

/// Record a duration histogram, in milliseconds.
pub fn timed(name: &'static str, started: Instant) {
    metrics::histogram!(name).record(started.elapsed().as_secs_f64() * 1000.0);
}

/// Snapshot of every counter emitted so far.
pub fn snapshot() -> BTreeMap<String, u64> {
    counters()
        .iter()
        .map(|entry| (entry.key().to_string(), entry.value().load(Ordering::Relaxed)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_snapshot() {
        increment("test.counter");
        increment("test.counter");
        let snap = snapshot();
        assert!(snap["test.counter"] >= 2);
    }
}
