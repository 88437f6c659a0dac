//! Backend handle caching
//!
//! Creating a delegated backend loads a model, which is far more expensive
//! than running it. The cache keeps one handle per strategy id for the
//! lifetime of the owning processor and shares it read-only across requests.

use crate::error::{BgRemovalError, Result};
use crate::inference::{BackendFactory, SegmentationBackend};
use crate::strategy::StrategyId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One cached backend handle
#[derive(Clone)]
struct SessionCacheEntry {
    backend: Arc<dyn SegmentationBackend>,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    hits: u64,
}

/// Metadata about a cached handle
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub strategy: StrategyId,
    pub backend_name: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub hits: u64,
}

/// Session cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCacheStats {
    /// Number of cached handles
    pub total_sessions: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl SessionCacheStats {
    /// Fraction of lookups served from the cache
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<StrategyId, SessionCacheEntry>,
    stats: SessionCacheStats,
}

/// Process-scoped cache of backend handles keyed by strategy id
///
/// The lock is held while a missing handle is created, so concurrent first
/// use of a strategy creates exactly one backend.
#[derive(Default)]
pub struct SessionCache {
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache").field("stats", &self.stats()).finish()
    }
}

impl SessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached handle for `strategy`, creating it through `factory` on first use
    ///
    /// # Errors
    /// - Backend creation failures (nothing is cached in that case)
    /// - Poisoned cache lock
    pub fn get_or_create(
        &self,
        strategy: StrategyId,
        factory: &dyn BackendFactory,
    ) -> Result<Arc<dyn SegmentationBackend>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BgRemovalError::internal("Session cache lock poisoned"))?;

        let now = Utc::now();
        if let Some(entry) = state.entries.get_mut(&strategy) {
            entry.hits += 1;
            entry.last_accessed = now;
            let backend = Arc::clone(&entry.backend);
            state.stats.cache_hits += 1;
            log::debug!("Reusing cached backend for strategy {strategy}");
            return Ok(backend);
        }

        state.stats.cache_misses += 1;
        log::debug!("Creating backend for strategy {strategy}");
        let backend = factory.create(strategy)?;
        state.entries.insert(
            strategy,
            SessionCacheEntry {
                backend: Arc::clone(&backend),
                created_at: now,
                last_accessed: now,
                hits: 0,
            },
        );
        state.stats.total_sessions = state.entries.len();
        log::info!("Cached backend '{}' for strategy {strategy}", backend.name());
        Ok(backend)
    }

    /// Whether a handle for `strategy` is cached
    #[must_use]
    pub fn contains(&self, strategy: StrategyId) -> bool {
        self.state
            .lock()
            .map(|state| state.entries.contains_key(&strategy))
            .unwrap_or(false)
    }

    /// Metadata for every cached handle, ordered by strategy id
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        let mut sessions: Vec<SessionInfo> = state
            .entries
            .iter()
            .map(|(&strategy, entry)| SessionInfo {
                strategy,
                backend_name: entry.backend.name().to_string(),
                created_at: entry.created_at,
                last_accessed: entry.last_accessed,
                hits: entry.hits,
            })
            .collect();
        sessions.sort_by_key(|s| s.strategy);
        sessions
    }

    #[must_use]
    pub fn stats(&self) -> SessionCacheStats {
        self.state.lock().map(|state| state.stats).unwrap_or_default()
    }

    /// Drop every cached handle, returning how many were removed
    pub fn clear(&self) -> usize {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        let removed = state.entries.len();
        state.entries.clear();
        state.stats.total_sessions = 0;
        if removed > 0 {
            log::info!("Cleared {removed} cached backend(s)");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockBackendFactory;

    #[test]
    fn test_second_lookup_is_a_hit() {
        let cache = SessionCache::new();
        let factory = MockBackendFactory::new();

        let first = cache.get_or_create(StrategyId::U2net, &factory).unwrap();
        let second = cache.get_or_create(StrategyId::U2net, &factory).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.creation_count(), 1);
        assert_eq!(
            cache.stats(),
            SessionCacheStats {
                total_sessions: 1,
                cache_hits: 1,
                cache_misses: 1,
            }
        );
        assert!((cache.stats().hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_handles_are_per_strategy() {
        let cache = SessionCache::new();
        let factory = MockBackendFactory::new();

        cache.get_or_create(StrategyId::U2net, &factory).unwrap();
        cache.get_or_create(StrategyId::Silueta, &factory).unwrap();

        let sessions = cache.sessions();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].strategy, StrategyId::U2net);
        assert_eq!(sessions[1].backend_name, "mock-silueta");
    }

    #[test]
    fn test_failed_creation_is_not_cached() {
        let cache = SessionCache::new();
        let factory = MockBackendFactory::new_creation_failing();

        assert!(cache.get_or_create(StrategyId::U2net, &factory).is_err());
        assert!(!cache.contains(StrategyId::U2net));
        assert_eq!(cache.stats().total_sessions, 0);
    }

    #[test]
    fn test_concurrent_first_use_creates_once() {
        let cache = Arc::new(SessionCache::new());
        let factory = Arc::new(MockBackendFactory::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let factory = Arc::clone(&factory);
                std::thread::spawn(move || {
                    cache
                        .get_or_create(StrategyId::IsnetGeneralUse, factory.as_ref())
                        .unwrap()
                })
            })
            .collect();
        let backends: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(factory.creation_count(), 1);
        assert!(backends.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.stats().cache_hits, 7);
    }

    #[test]
    fn test_clear() {
        let cache = SessionCache::new();
        let factory = MockBackendFactory::new();
        cache.get_or_create(StrategyId::U2net, &factory).unwrap();

        assert_eq!(cache.clear(), 1);
        assert!(!cache.contains(StrategyId::U2net));

        cache.get_or_create(StrategyId::U2net, &factory).unwrap();
        assert_eq!(factory.creation_count(), 2);
    }
}
