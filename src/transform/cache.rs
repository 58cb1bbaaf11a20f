//! Compiled-expression cache.
//!
//! # Responsibilities
//! - Map expression source text to its compiled form
//! - Bound memory with least-recently-used eviction
//! - Expire entries lazily on lookup once their TTL has passed
//!
//! # Design Decisions
//! - Keys are SHA-256 digests of the full source text, so two expressions
//!   sharing a long prefix can never collide
//! - One mutex guards the whole map; capacity is small and critical
//!   sections are a hash lookup plus, on insert at capacity, a linear scan
//! - Recency is a monotonically increasing tick rather than a linked list

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::expression::CompiledExpression;
use crate::observability::metrics;

pub const DEFAULT_CAPACITY: usize = 100;

/// Content-derived cache key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn from_source(source: &str) -> Self {
        let digest = Sha256::digest(source.as_bytes());
        Self(digest.into())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey(")?;
        for byte in &self.0[..6] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "…)")
    }
}

struct CacheEntry {
    compiled: Arc<dyn CompiledExpression>,
    cached_at: Instant,
    ttl: Duration,
    last_used: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.cached_at) > self.ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    tick: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Bounded LRU cache with per-entry TTL, safe to share across tasks.
pub struct ExpressionCache {
    state: Mutex<CacheState>,
    capacity: usize,
}

impl ExpressionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Entries stay consistent even if a holder panicked mid-operation.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the compiled form of `source`, promoting it to most recently used.
    pub fn get(&self, source: &str) -> Option<Arc<dyn CompiledExpression>> {
        let key = CacheKey::from_source(source);
        let now = Instant::now();
        let mut state = self.lock();
        let tick = state.next_tick();

        let expired = match state.entries.get_mut(&key) {
            None => {
                metrics::record_cache_event("miss");
                return None;
            }
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                entry.last_used = tick;
                metrics::record_cache_event("hit");
                return Some(Arc::clone(&entry.compiled));
            }
        };

        if expired {
            state.entries.remove(&key);
            metrics::record_cache_event("expired");
            metrics::record_cache_size(state.entries.len());
        }
        None
    }

    /// Insert a compiled expression, evicting the least recently used entry at capacity.
    pub fn put(&self, source: &str, compiled: Arc<dyn CompiledExpression>, ttl: Duration) {
        let key = CacheKey::from_source(source);
        let mut state = self.lock();
        let tick = state.next_tick();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            let victim = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| *k);
            if let Some(victim) = victim {
                state.entries.remove(&victim);
                metrics::record_cache_event("evicted");
                tracing::debug!(key = ?victim, "Evicted least recently used expression");
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                compiled,
                cached_at: Instant::now(),
                ttl,
                last_used: tick,
            },
        );
        metrics::record_cache_size(state.entries.len());
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        metrics::record_cache_size(0);
    }

    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ExpressionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for ExpressionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionCache")
            .field("size", &self.size())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{ExpressionError, Interrupt};
    use serde_json::Value;

    /// Compiled stand-in that always yields a fixed tag.
    struct Tagged(&'static str);

    impl CompiledExpression for Tagged {
        fn evaluate(&self, _input: &Value, _interrupt: &Interrupt) -> Result<Value, ExpressionError> {
            Ok(Value::String(self.0.to_string()))
        }
    }

    fn tag_of(compiled: &Arc<dyn CompiledExpression>) -> Value {
        compiled.evaluate(&Value::Null, &Interrupt::new()).unwrap()
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_put_and_get() {
        let cache = ExpressionCache::new(4);
        assert!(cache.get("a").is_none());

        cache.put("a", Arc::new(Tagged("a")), HOUR);
        assert_eq!(tag_of(&cache.get("a").unwrap()), "a");
        assert_eq!(cache.size(), 1);

        cache.clear();
        assert_eq!(cache.size(), 0);
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_shared_prefix_does_not_collide() {
        let prefix = "x".repeat(150);
        let first = format!("{}first", prefix);
        let second = format!("{}second", prefix);

        let cache = ExpressionCache::new(4);
        cache.put(&first, Arc::new(Tagged("first")), HOUR);
        cache.put(&second, Arc::new(Tagged("second")), HOUR);

        assert_eq!(cache.size(), 2);
        assert_eq!(tag_of(&cache.get(&first).unwrap()), "first");
        assert_eq!(tag_of(&cache.get(&second).unwrap()), "second");
    }

    #[test]
    fn test_ttl_expiry_removes_entry() {
        let cache = ExpressionCache::new(4);
        cache.put("short", Arc::new(Tagged("short")), Duration::from_millis(20));
        cache.put("long", Arc::new(Tagged("long")), HOUR);

        std::thread::sleep(Duration::from_millis(40));

        assert!(cache.get("short").is_none());
        assert_eq!(cache.size(), 1);
        assert!(cache.get("long").is_some());
    }

    #[test]
    fn test_lru_eviction_respects_recent_gets() {
        let cache = ExpressionCache::new(3);
        cache.put("a", Arc::new(Tagged("a")), HOUR);
        cache.put("b", Arc::new(Tagged("b")), HOUR);
        cache.put("c", Arc::new(Tagged("c")), HOUR);

        // Touch the oldest insert so "b" becomes least recently used.
        assert!(cache.get("a").is_some());
        cache.put("d", Arc::new(Tagged("d")), HOUR);

        assert_eq!(cache.size(), 3);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
    }

    #[test]
    fn test_reinsert_does_not_evict() {
        let cache = ExpressionCache::new(2);
        cache.put("a", Arc::new(Tagged("a")), HOUR);
        cache.put("b", Arc::new(Tagged("b")), HOUR);
        cache.put("a", Arc::new(Tagged("a2")), HOUR);

        assert_eq!(cache.size(), 2);
        assert_eq!(tag_of(&cache.get("a").unwrap()), "a2");
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(ExpressionCache::new(16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("expr-{}", (t * 7 + i) % 32);
                        if cache.get(&key).is_none() {
                            cache.put(&key, Arc::new(Tagged("x")), HOUR);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.size() <= 16);
    }
}
