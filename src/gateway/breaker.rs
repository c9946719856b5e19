//! Per-provider availability breakers.
//!
//! A breaker starts `Available` and trips on the first breaker-tripping error
//! (`Unauthorized`, `QuotaExhausted`, `NotConfigured`). A tripped provider is
//! skipped by the orchestrator until an operator resets it, or, when
//! [`BreakerConfig::recovery_after`] is set, until that long has passed since
//! the trip; then a single probe call is let through per window.
//!
//! State lives in atomics; the registry map is only written when a provider
//! is first registered. Two tasks racing to trip the same breaker is benign:
//! at worst one extra call reaches a provider that is already known down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::TripReason;
use crate::telemetry;

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Available,
    Tripped,
}

/// Snapshot of one registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub model: String,
    pub state: BreakerState,
    pub trip_reason: Option<TripReason>,
}

/// Breaker behavior shared by every provider in a registry.
#[derive(Debug, Clone, Default)]
pub struct BreakerConfig {
    /// Admit a probe call this long after a trip. Default: none (manual
    /// reset only).
    pub recovery_after: Option<Duration>,
}

impl BreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recovery_after(mut self, after: Option<Duration>) -> Self {
        self.recovery_after = after;
        self
    }
}

const AVAILABLE: u8 = 0;

fn encode(reason: TripReason) -> u8 {
    match reason {
        TripReason::QuotaExhausted => 1,
        TripReason::Unauthorized => 2,
        TripReason::NotConfigured => 3,
    }
}

fn decode(raw: u8) -> Option<TripReason> {
    match raw {
        1 => Some(TripReason::QuotaExhausted),
        2 => Some(TripReason::Unauthorized),
        3 => Some(TripReason::NotConfigured),
        _ => None,
    }
}

#[derive(Debug)]
struct Breaker {
    model: String,
    state: AtomicU8,
    /// Milliseconds since the registry epoch at the last trip or probe.
    tripped_at_ms: AtomicU64,
}

impl Breaker {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            state: AtomicU8::new(AVAILABLE),
            tripped_at_ms: AtomicU64::new(0),
        }
    }

    fn reason(&self) -> Option<TripReason> {
        decode(self.state.load(Ordering::Acquire))
    }
}

/// Process-wide breaker state for every provider.
///
/// Shared as `Arc<BreakerRegistry>` between the orchestrator and operator
/// tooling.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    epoch: Instant,
    breakers: RwLock<Vec<(String, Arc<Breaker>)>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            epoch: Instant::now(),
            breakers: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn get(&self, name: &str) -> Option<Arc<Breaker>> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        breakers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| Arc::clone(b))
    }

    fn get_or_register(&self, name: &str, model: &str) -> Arc<Breaker> {
        if let Some(b) = self.get(name) {
            return b;
        }
        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, b)) = breakers.iter().find(|(n, _)| n == name) {
            return Arc::clone(b);
        }
        let breaker = Arc::new(Breaker::new(model));
        breakers.push((name.to_string(), Arc::clone(&breaker)));
        breaker
    }

    /// Register a provider. Registering an existing name keeps its state.
    pub fn register(&self, name: &str, model: &str) {
        self.get_or_register(name, model);
    }

    /// Whether calls to `name` should be attempted. Unknown names are available.
    ///
    /// With recovery enabled, a tripped breaker admits exactly one caller per
    /// `recovery_after` window.
    pub fn is_available(&self, name: &str) -> bool {
        let Some(breaker) = self.get(name) else {
            return true;
        };
        if breaker.state.load(Ordering::Acquire) == AVAILABLE {
            return true;
        }
        let Some(after) = self.config.recovery_after else {
            return false;
        };

        let now = self.now_ms();
        let last = breaker.tripped_at_ms.load(Ordering::Acquire);
        let window = u64::try_from(after.as_millis()).unwrap_or(u64::MAX);
        if now.saturating_sub(last) < window {
            return false;
        }
        // Only the task that moves the window forward gets to probe.
        let admitted = breaker
            .tripped_at_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if admitted {
            tracing::info!(provider = name, "admitting recovery probe");
        }
        admitted
    }

    /// Trip `name` for `reason`. Returns true if this call changed the state.
    pub fn trip(&self, name: &str, reason: TripReason) -> bool {
        let breaker = self.get_or_register(name, "");
        breaker.tripped_at_ms.store(self.now_ms(), Ordering::Release);
        let previous = breaker.state.swap(encode(reason), Ordering::AcqRel);
        if previous == AVAILABLE {
            tracing::warn!(provider = name, reason = %reason, "provider breaker tripped");
            metrics::counter!(telemetry::BREAKER_TRIPS_TOTAL,
                "provider" => name.to_owned(),
                "reason" => reason.as_str(),
            )
            .increment(1);
            true
        } else {
            false
        }
    }

    /// Note a successful call; closes a breaker whose recovery probe succeeded.
    /// Without recovery configured this is a no-op: trips stay until reset.
    pub fn record_success(&self, name: &str) {
        if self.config.recovery_after.is_none() {
            return;
        }
        if let Some(breaker) = self.get(name)
            && breaker.state.swap(AVAILABLE, Ordering::AcqRel) != AVAILABLE
        {
            tracing::info!(provider = name, "provider recovered");
        }
    }

    pub fn state(&self, name: &str) -> Option<BreakerState> {
        self.get(name).map(|b| match b.reason() {
            Some(_) => BreakerState::Tripped,
            None => BreakerState::Available,
        })
    }

    pub fn trip_reason(&self, name: &str) -> Option<TripReason> {
        self.get(name).and_then(|b| b.reason())
    }

    /// Reset one breaker. Returns false for unknown names.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.state.store(AVAILABLE, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Return every breaker to `Available`.
    pub fn reset_all(&self) {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        for (_, breaker) in breakers.iter() {
            breaker.state.store(AVAILABLE, Ordering::Release);
        }
        tracing::info!(count = breakers.len(), "all provider breakers reset");
    }

    /// Registered providers in registration order.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        breakers
            .iter()
            .map(|(name, b)| {
                let trip_reason = b.reason();
                ProviderDescriptor {
                    name: name.clone(),
                    model: b.model.clone(),
                    state: if trip_reason.is_some() {
                        BreakerState::Tripped
                    } else {
                        BreakerState::Available
                    },
                    trip_reason,
                }
            })
            .collect()
    }

    /// Trip counts by reason across all registered providers.
    pub fn tripped_by_reason(&self) -> HashMap<TripReason, usize> {
        let mut counts = HashMap::new();
        for descriptor in self.descriptors() {
            if let Some(reason) = descriptor.trip_reason {
                *counts.entry(reason).or_insert(0) += 1;
            }
        }
        counts
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
