//! Hit/miss accounting for the cache store.

use std::collections::HashMap;

use serde::Serialize;

use super::backend::BackendKind;

/// Per-key counters are dropped for new keys once this many keys are tracked.
const MAX_TRACKED_KEYS: usize = 10_000;

/// Counters for a single key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyStats {
    pub hits: u64,
    pub misses: u64,
    pub operations: u64,
    pub errors: u64,
}

impl KeyStats {
    pub fn hit_ratio(&self) -> f64 {
        CacheStats::ratio(self.hits, self.misses)
    }
}

/// Aggregate counters for a cache store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Every get, set, delete and exists call.
    pub operations: u64,
    /// Remote backend failures.
    pub errors: u64,
    /// `hits / (hits + misses)`, or 0.0 before the first lookup.
    pub hit_ratio: f64,
    /// Backend currently serving requests.
    pub backend: BackendKind,
    /// Whether a remote backend was configured and has failed.
    pub degraded: bool,
    /// Number of keys with per-key counters.
    pub tracked_keys: usize,
}

impl CacheStats {
    pub fn ratio(hits: u64, misses: u64) -> f64 {
        let lookups = hits + misses;
        if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Hit,
    Miss,
    /// A non-lookup operation.
    Op,
    Error,
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    total: KeyStats,
    per_key: HashMap<String, KeyStats>,
}

impl StatsRecorder {
    /// Count `outcome` in the totals and, when a key is given, for that key.
    pub(crate) fn record(&mut self, key: Option<&str>, outcome: Outcome) {
        Self::apply(&mut self.total, outcome);

        let Some(key) = key else {
            return;
        };
        if let Some(stats) = self.per_key.get_mut(key) {
            Self::apply(stats, outcome);
        } else if self.per_key.len() < MAX_TRACKED_KEYS {
            let stats = self.per_key.entry(key.to_string()).or_default();
            Self::apply(stats, outcome);
        }
    }

    fn apply(stats: &mut KeyStats, outcome: Outcome) {
        match outcome {
            Outcome::Hit => {
                stats.hits += 1;
                stats.operations += 1;
            }
            Outcome::Miss => {
                stats.misses += 1;
                stats.operations += 1;
            }
            Outcome::Op => stats.operations += 1,
            Outcome::Error => stats.errors += 1,
        }
    }

    pub(crate) fn key(&self, key: &str) -> Option<KeyStats> {
        self.per_key.get(key).copied()
    }

    pub(crate) fn snapshot(&self, backend: BackendKind, degraded: bool) -> CacheStats {
        CacheStats {
            hits: self.total.hits,
            misses: self.total.misses,
            operations: self.total.operations,
            errors: self.total.errors,
            hit_ratio: CacheStats::ratio(self.total.hits, self.total.misses),
            backend,
            degraded,
            tracked_keys: self.per_key.len(),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.total = KeyStats::default();
        self.per_key.clear();
    }
}
