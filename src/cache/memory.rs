//! Bounded in-process backend.
//!
//! Used directly when no remote backend is configured and as the fallback
//! once a remote backend has failed. Eviction removes the entry with the
//! earliest creation time, not the least recently used one: reads never
//! extend an entry's life.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use super::backend::{BackendKind, CacheBackend};
use crate::Result;

/// Default capacity of the in-process backend.
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

/// Recursion cap for `*`, matching the server's own limit.
const MAX_PATTERN_NESTING: usize = 1_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    expires_at: Instant,
    /// Insertion counter; breaks ties between entries created in the same instant.
    seq: u64,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    next_seq: u64,
}

impl Inner {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before - self.entries.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.created_at, e.seq))
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            tracing::debug!(key = %key, "evicting oldest cache entry");
            self.entries.remove(&key);
        }
    }
}

/// Thread-safe map with per-entry expiry and a hard entry cap.
///
/// A single mutex guards the map and is never held across an await point.
#[derive(Debug)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl MemoryBackend {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get_value(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value` for `ttl`. A zero TTL removes the key instead.
    pub(crate) fn set_value(&self, key: &str, value: Value, ttl: Duration) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.sweep(now);
        if ttl.is_zero() {
            inner.entries.remove(key);
            return;
        }

        // Overwrites take a fresh creation time, so drop the old entry first.
        if inner.entries.remove(key).is_none() && inner.entries.len() >= self.max_entries {
            inner.evict_oldest();
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
                seq,
            },
        );
    }

    pub(crate) fn delete_key(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        inner
            .entries
            .remove(key)
            .is_some_and(|entry| entry.is_live(now))
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.get_value(key).is_some()
    }

    pub(crate) fn delete_matching(&self, pattern: &str) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.sweep(now);
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key_matches(pattern, key));
        before - inner.entries.len()
    }

    /// Number of entries, including expired ones not yet swept.
    pub fn entry_count(&self) -> usize {
        self.lock().entries.len()
    }

    pub(crate) fn clear_all(&self) {
        self.lock().entries.clear();
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

/// Match `key` against a Redis `KEYS` pattern.
///
/// Follows the server byte for byte: `*` and `?`, classes with `^`
/// negation, ranges (reversed ends are swapped) and `\` escapes. No pattern
/// is invalid; an unterminated class ends at the end of the pattern.
pub fn key_matches(pattern: &str, key: &str) -> bool {
    let mut exhausted = false;
    match_bytes(pattern.as_bytes(), key.as_bytes(), &mut exhausted, 0)
}

/// `exhausted` is set once a `*` has tried every suffix of the key, so
/// outer stars stop retrying longer prefixes.
fn match_bytes(pat: &[u8], key: &[u8], exhausted: &mut bool, nesting: usize) -> bool {
    if nesting > MAX_PATTERN_NESTING {
        return false;
    }
    let (mut p, mut k) = (0, 0);
    while p < pat.len() && k < key.len() {
        match pat[p] {
            b'*' => {
                while p + 1 < pat.len() && pat[p + 1] == b'*' {
                    p += 1;
                }
                if p + 1 == pat.len() {
                    return true;
                }
                while k < key.len() {
                    if match_bytes(&pat[p + 1..], &key[k..], exhausted, nesting + 1) {
                        return true;
                    }
                    if *exhausted {
                        return false;
                    }
                    k += 1;
                }
                *exhausted = true;
                return false;
            }
            b'?' => k += 1,
            b'[' => {
                p += 1;
                let negate = pat.get(p) == Some(&b'^');
                if negate {
                    p += 1;
                }
                let c = key[k];
                let mut matched = false;
                loop {
                    match pat.get(p) {
                        Some(b'\\') if p + 1 < pat.len() => {
                            p += 1;
                            matched |= pat[p] == c;
                        }
                        Some(b']') => break,
                        None => {
                            // Step back so the advance below lands on the end.
                            p -= 1;
                            break;
                        }
                        Some(&lo) if p + 2 < pat.len() && pat[p + 1] == b'-' => {
                            let hi = pat[p + 2];
                            let (lo, hi) = if lo > hi { (hi, lo) } else { (lo, hi) };
                            matched |= (lo..=hi).contains(&c);
                            p += 2;
                        }
                        Some(&member) => matched |= member == c,
                    }
                    p += 1;
                }
                if matched == negate {
                    return false;
                }
                k += 1;
            }
            b'\\' if p + 1 < pat.len() => {
                p += 1;
                if pat[p] != key[k] {
                    return false;
                }
                k += 1;
            }
            literal => {
                if literal != key[k] {
                    return false;
                }
                k += 1;
            }
        }
        p += 1;
        if k == key.len() {
            while p < pat.len() && pat[p] == b'*' {
                p += 1;
            }
            break;
        }
    }
    p == pat.len() && k == key.len()
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get_value(key))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        self.set_value(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.delete_key(key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.contains(key))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        Ok(self.delete_matching(pattern))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entry_count())
    }

    async fn clear(&self) -> Result<()> {
        self.clear_all();
        Ok(())
    }
}
