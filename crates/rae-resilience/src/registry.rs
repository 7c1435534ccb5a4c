//! Process-scoped breaker registry
//!
//! Get-or-create by resource name. The registry is an ordinary value: whoever
//! owns the process lifetime constructs it and hands out `Arc`s.

use crate::breaker::{BreakerStatus, CircuitBreaker};
use dashmap::DashMap;
use rae_core::{BreakerConfig, EventSink, NullSink};
use std::sync::Arc;

/// Shared map of named breakers
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: BreakerConfig,
    sink: Arc<dyn EventSink>,
}

impl BreakerRegistry {
    /// Create registry with default breaker configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_defaults(BreakerConfig::default())
    }

    /// Create registry whose breakers use `defaults` unless told otherwise
    #[must_use]
    pub fn with_defaults(defaults: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults,
            sink: Arc::new(NullSink),
        }
    }

    /// With event sink handed to every breaker created afterwards
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Breaker for `name`, created with the registry defaults if absent
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, self.defaults)
    }

    /// Breaker for `name`, created with `config` if absent
    ///
    /// An existing breaker keeps its original configuration.
    pub fn get_or_create_with(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }

        let entry = self.breakers.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(resource = name, "creating circuit breaker");
            Arc::new(CircuitBreaker::new(name, config).with_sink(Arc::clone(&self.sink)))
        });
        Arc::clone(entry.value())
    }

    /// Existing breaker, if any
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    /// Status of every breaker, sorted by name
    #[must_use]
    pub fn status_all(&self) -> Vec<BreakerStatus> {
        let mut all: Vec<_> = self.breakers.iter().map(|b| b.value().status()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Reset one breaker; false if unknown
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every breaker
    pub fn reset_all(&self) {
        for breaker in self.breakers.iter() {
            breaker.value().reset();
        }
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.breakers.iter().map(|b| b.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of breakers
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// True when no breaker has been created
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("breakers", &self.names())
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;

    #[test]
    fn same_name_same_instance() {
        let registry = BreakerRegistry::new();
        let a = registry.get_or_create("llm");
        let b = registry.get_or_create("llm");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn existing_breaker_keeps_config() {
        let registry = BreakerRegistry::new();
        let first = registry.get_or_create_with("db", BreakerConfig::new().with_failure_threshold(2));
        let second =
            registry.get_or_create_with("db", BreakerConfig::new().with_failure_threshold(9));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.config().failure_threshold, 2);
    }

    #[test]
    fn reset_and_status() {
        let registry = BreakerRegistry::with_defaults(BreakerConfig::new().with_failure_threshold(1));
        registry.get_or_create("b").record_failure();
        registry.get_or_create("a");

        let status = registry.status_all();
        assert_eq!(status[0].name, "a");
        assert_eq!(status[1].state, CircuitState::Open);

        assert!(registry.reset("b"));
        assert!(!registry.reset("missing"));
        assert_eq!(registry.get("b").unwrap().state(), CircuitState::Closed);
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn concurrent_get_or_create_yields_one_breaker() {
        let registry = Arc::new(BreakerRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_or_create("shared"))
            })
            .collect();

        let breakers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(breakers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }
}
