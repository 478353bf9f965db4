//! Application-owned map of named circuit breakers.

use crate::breaker::{CircuitBreaker, CircuitBreakerStats};
use crate::options::CircuitBreakerOptions;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Named circuit breakers, one per protected operation.
///
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct CircuitBreakers {
    breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,
    defaults: CircuitBreakerOptions,
}

impl CircuitBreakers {
    /// Create an empty map using default options for new breakers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty map with the given options for new breakers.
    pub fn with_defaults(defaults: CircuitBreakerOptions) -> Self {
        Self {
            breakers: Arc::new(RwLock::new(HashMap::new())),
            defaults,
        }
    }

    /// Get the breaker for `name`, creating it with the default options.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, self.defaults.clone())
    }

    /// Get the breaker for `name`, creating it with `options` if absent.
    ///
    /// Options are ignored when the breaker already exists.
    pub fn get_or_create_with(&self, name: &str, options: CircuitBreakerOptions) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(name) {
            return Arc::clone(existing);
        }

        let mut breakers = self.breakers.write();
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            debug!(name, "Registering circuit breaker");
            CircuitBreaker::create(name, options)
        }))
    }

    /// Insert a breaker under its own name, replacing any previous one.
    pub fn insert(&self, breaker: Arc<CircuitBreaker>) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .write()
            .insert(breaker.name().to_string(), breaker)
    }

    /// Get an existing breaker.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    /// Remove a breaker.
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.write().remove(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Statistics for every breaker, sorted by name.
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<CircuitBreakerStats> =
            self.breakers.read().values().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Number of breakers.
    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    /// Whether no breaker is registered.
    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;

    #[test]
    fn test_get_or_create_reuses_breaker() {
        let breakers = CircuitBreakers::new();

        let first = breakers.get_or_create("payments");
        let second = breakers.get_or_create("payments");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(breakers.len(), 1);
    }

    #[test]
    fn test_defaults_apply_to_new_breakers() {
        let breakers =
            CircuitBreakers::with_defaults(CircuitBreakerOptions::new().max_failures(1));
        let cb = breakers.get_or_create("search");

        let _ = cb.execute_blocking(|| Err::<(), _>("down"));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_clones_share_breakers() {
        let breakers = CircuitBreakers::new();
        let shared = breakers.clone();

        breakers.get_or_create("b");
        shared.get_or_create("a");

        assert_eq!(breakers.names(), vec!["a".to_string(), "b".to_string()]);
        assert!(shared.remove("a").is_some());
        assert!(breakers.get("a").is_none());
    }
}
