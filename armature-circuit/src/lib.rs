//! Circuit Breaker for Armature
//!
//! Protects callers from cascading failures when invoking remote or fragile
//! operations.
//!
//! ## Features
//!
//! - **State machine** - Closed, Open and Half-Open with failure accounting
//! - **Fallbacks** - Call-scoped or breaker-scoped substitute results
//! - **Deadlines** - Per-call timeouts for async code, counted as failures
//! - **Promises** - Callback-style completion with at-most-once accounting
//! - **Observers** - `on_open`, `on_half_open`, `on_close`, `on_fallback`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use armature_circuit::*;
//! use std::time::Duration;
//!
//! let breakers = CircuitBreakers::new();
//! let breaker = breakers.get_or_create_with(
//!     "pricing",
//!     CircuitBreakerOptions::new()
//!         .max_failures(3)
//!         .reset_timeout(Duration::from_secs(5)),
//! );
//!
//! breaker.on_open(|cb| tracing::warn!(name = cb.name(), "pricing unavailable"));
//!
//! let price = breaker
//!     .execute_with_fallback(|| async { pricing.quote(sku).await }, |_| Price::default())
//!     .await?;
//! ```

mod breaker;
mod error;
mod options;
mod promise;
mod registry;

pub use breaker::{BreakerHandler, CircuitBreaker, CircuitBreakerStats, CircuitState, FallbackFn};
pub use error::{BreakerFailure, CircuitBreakerError};
pub use options::{
    CircuitBreakerOptions, DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT_MS, DEFAULT_TIMEOUT_MS,
};
pub use promise::Promise;
pub use registry::CircuitBreakers;
