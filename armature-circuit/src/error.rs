//! Circuit breaker error types.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error returned by a protected call.
///
/// Breaker-internal outcomes ([`Open`](Self::Open), [`Timeout`](Self::Timeout))
/// are kept apart from the protected code's own error so callers can retry
/// differently.
#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open and the call was not executed.
    Open(String),
    /// The call did not complete before the deadline.
    Timeout(Duration),
    /// The call ran and failed.
    Failure(E),
}

impl<E> CircuitBreakerError<E> {
    /// The call was rejected by an open circuit.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// The call exceeded its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The protected code itself failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Borrow the protected code's error.
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Failure(e) => Some(e),
            _ => None,
        }
    }

    /// Take the protected code's error.
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Failure(e) => Some(e),
            _ => None,
        }
    }

    /// Map the wrapped error.
    pub fn map_failure<F, O>(self, f: O) -> CircuitBreakerError<F>
    where
        O: FnOnce(E) -> F,
    {
        match self {
            Self::Open(name) => CircuitBreakerError::Open(name),
            Self::Timeout(d) => CircuitBreakerError::Timeout(d),
            Self::Failure(e) => CircuitBreakerError::Failure(f(e)),
        }
    }
}

impl<E: fmt::Display> fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(name) => write!(f, "Circuit breaker '{}' is open", name),
            Self::Timeout(d) => write!(f, "Operation timed out after {:?}", d),
            Self::Failure(e) => write!(f, "Execution failed: {}", e),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for CircuitBreakerError<E> {}

/// Why a breaker-scoped fallback was invoked.
///
/// Breaker-scoped fallbacks are shared by calls with different error types,
/// so they receive this summary instead of the typed error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakerFailure {
    /// Call rejected by an open circuit.
    #[error("circuit open")]
    Open,
    /// Call exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Call failed with the given message.
    #[error("{0}")]
    Failure(String),
}

impl<E: fmt::Display> From<&CircuitBreakerError<E>> for BreakerFailure {
    fn from(error: &CircuitBreakerError<E>) -> Self {
        match error {
            CircuitBreakerError::Open(_) => Self::Open,
            CircuitBreakerError::Timeout(d) => Self::Timeout(*d),
            CircuitBreakerError::Failure(e) => Self::Failure(e.to_string()),
        }
    }
}
