//! Registration and creation counters.
//!
//! The collector is shared by the container and every resolver it hands
//! out. Counters never influence resolution.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::scope::Lifecycle;

/// Labels describing one registration, e.g. `["transient", "scoped", "factory"]`.
pub(crate) fn registration_labels(lifecycle: Lifecycle, is_factory: bool, tagged: bool) -> Vec<&'static str> {
    let mut labels = vec![lifecycle.label()];
    if lifecycle == Lifecycle::ScopedTransient {
        labels.push("scoped");
    }
    if is_factory {
        labels.push("factory");
    }
    if tagged {
        labels.push("tagged");
    }
    labels
}

/// Container-wide counters keyed by canonical key.
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    registered_total: AtomicU64,
    registered_by_kind: DashMap<&'static str, u64>,
    registered_labels: DashMap<String, Vec<&'static str>>,
    created_total: AtomicU64,
    created_by_key: DashMap<String, u64>,
    singleton_reuse_total: AtomicU64,
    singleton_reuses: DashMap<String, u64>,
    scoped_hit_total: AtomicU64,
    scoped_hits: DashMap<String, u64>,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_registration(&self, key: &str, labels: &[&'static str]) {
        self.registered_total.fetch_add(1, Ordering::Relaxed);
        for label in labels {
            *self.registered_by_kind.entry(*label).or_insert(0) += 1;
        }
        let mut applied = self.registered_labels.entry(key.to_string()).or_default();
        for label in labels {
            if !applied.contains(label) {
                applied.push(*label);
            }
        }
    }

    pub(crate) fn record_creation(&self, key: &str) {
        self.created_total.fetch_add(1, Ordering::Relaxed);
        *self.created_by_key.entry(key.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn record_singleton_reuse(&self, key: &str) {
        self.singleton_reuse_total.fetch_add(1, Ordering::Relaxed);
        *self.singleton_reuses.entry(key.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn record_scoped_hit(&self, key: &str) {
        self.scoped_hit_total.fetch_add(1, Ordering::Relaxed);
        *self.scoped_hits.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Number of instances created under `key` since the last reset.
    pub fn created(&self, key: &str) -> u64 {
        self.created_by_key.get(key).map(|c| *c).unwrap_or(0)
    }

    /// Clears creation, reuse and scoped-hit counters.
    ///
    /// Registration counters describe the registry and survive a reset.
    pub fn reset(&self) {
        self.created_total.store(0, Ordering::Relaxed);
        self.created_by_key.clear();
        self.singleton_reuse_total.store(0, Ordering::Relaxed);
        self.singleton_reuses.clear();
        self.scoped_hit_total.store(0, Ordering::Relaxed);
        self.scoped_hits.clear();
        debug!("Statistics counters reset");
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            taken_at: SystemTime::now(),
            registered: RegisteredStats {
                total: self.registered_total.load(Ordering::Relaxed),
                by_kind: collect(&self.registered_by_kind, |k| (*k).to_string()),
                labels: self
                    .registered_labels
                    .iter()
                    .map(|e| (e.key().clone(), e.value().clone()))
                    .collect(),
            },
            created: CounterStats {
                total: self.created_total.load(Ordering::Relaxed),
                by_key: collect(&self.created_by_key, Clone::clone),
            },
            singleton_reuses: CounterStats {
                total: self.singleton_reuse_total.load(Ordering::Relaxed),
                by_key: collect(&self.singleton_reuses, Clone::clone),
            },
            scoped_hits: CounterStats {
                total: self.scoped_hit_total.load(Ordering::Relaxed),
                by_key: collect(&self.scoped_hits, Clone::clone),
            },
        }
    }
}

fn collect<K>(map: &DashMap<K, u64>, key: impl Fn(&K) -> String) -> BTreeMap<String, u64>
where
    K: Eq + std::hash::Hash,
{
    map.iter().map(|e| (key(e.key()), *e.value())).collect()
}

/// Serializable copy of the collector's counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatisticsSnapshot {
    pub taken_at: SystemTime,
    pub registered: RegisteredStats,
    pub created: CounterStats,
    pub singleton_reuses: CounterStats,
    pub scoped_hits: CounterStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredStats {
    pub total: u64,
    /// Registrations per label (`instance`, `transient`, `scoped`, ...).
    pub by_kind: BTreeMap<String, u64>,
    /// Labels applied to each key, deduplicated, in first-seen order.
    pub labels: BTreeMap<String, Vec<&'static str>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterStats {
    pub total: u64,
    pub by_key: BTreeMap<String, u64>,
}
