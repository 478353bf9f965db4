//! Circuit breaker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of failures before the circuit opens.
pub const DEFAULT_MAX_FAILURES: u32 = 5;

/// Default per-call deadline in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default delay before an open circuit admits a probe, in milliseconds.
pub const DEFAULT_RESET_TIMEOUT_MS: i64 = 30_000;

/// Circuit breaker options.
///
/// Durations are kept in milliseconds so the struct maps one-to-one onto
/// configuration files:
///
/// ```toml
/// max_failures = 3
/// timeout_ms = 2000        # 0 disables the per-call deadline
/// reset_timeout_ms = 5000  # -1 disables automatic half-open probing
/// fallback_on_failure = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerOptions {
    /// Number of consecutive failures before opening the circuit.
    pub max_failures: u32,
    /// Deadline applied to asynchronous calls. `0` means no deadline.
    pub timeout_ms: u64,
    /// Time spent open before a half-open probe is allowed. Negative disables it.
    pub reset_timeout_ms: i64,
    /// Run the fallback when a call fails while closed or half-open, not only when open.
    pub fallback_on_failure: bool,
    /// Address a hosting process may publish state changes to.
    pub notification_address: Option<String>,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            reset_timeout_ms: DEFAULT_RESET_TIMEOUT_MS,
            fallback_on_failure: false,
            notification_address: None,
        }
    }
}

impl CircuitBreakerOptions {
    /// Create options with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold.
    pub fn max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Set the per-call deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = whole_millis(timeout);
        self
    }

    /// Disable the per-call deadline.
    pub fn no_timeout(mut self) -> Self {
        self.timeout_ms = 0;
        self
    }

    /// Set how long the circuit stays open before probing.
    pub fn reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout_ms = i64::try_from(whole_millis(reset_timeout)).unwrap_or(i64::MAX);
        self
    }

    /// Keep the circuit open until [`reset`](crate::CircuitBreaker::reset) is called.
    pub fn disable_reset(mut self) -> Self {
        self.reset_timeout_ms = -1;
        self
    }

    /// Enable or disable fallback on failure.
    pub fn fallback_on_failure(mut self, enabled: bool) -> Self {
        self.fallback_on_failure = enabled;
        self
    }

    /// Set the notification address.
    pub fn notification_address(mut self, address: impl Into<String>) -> Self {
        self.notification_address = Some(address.into());
        self
    }

    /// Per-call deadline, if any.
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Delay before an open circuit admits a probe, if automatic reset is enabled.
    pub fn reset_after(&self) -> Option<Duration> {
        u64::try_from(self.reset_timeout_ms)
            .ok()
            .map(Duration::from_millis)
    }

    /// Effective failure threshold. A zero threshold trips on the first failure.
    pub(crate) fn threshold(&self) -> u32 {
        self.max_failures.max(1)
    }
}

/// Milliseconds in `duration`, rounding a non-zero sub-millisecond value up to 1.
fn whole_millis(duration: Duration) -> u64 {
    if duration.is_zero() {
        return 0;
    }
    u64::try_from(duration.as_millis().max(1)).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CircuitBreakerOptions::default();
        assert_eq!(options.max_failures, 5);
        assert_eq!(options.call_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(options.reset_after(), Some(Duration::from_secs(30)));
        assert!(!options.fallback_on_failure);
    }

    #[test]
    fn test_disabled_timers() {
        let options = CircuitBreakerOptions::new().no_timeout().disable_reset();
        assert_eq!(options.call_timeout(), None);
        assert_eq!(options.reset_after(), None);
    }

    #[test]
    fn test_deserialize_partial() {
        let options: CircuitBreakerOptions =
            serde_json::from_str(r#"{"max_failures": 3, "reset_timeout_ms": -1}"#).unwrap();

        assert_eq!(options.max_failures, 3);
        assert_eq!(options.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(options.reset_after(), None);
    }

    #[test]
    fn test_sub_millisecond_durations_keep_a_deadline() {
        let options = CircuitBreakerOptions::new()
            .timeout(Duration::from_micros(500))
            .reset_timeout(Duration::from_nanos(1));

        assert_eq!(options.timeout_ms, 1);
        assert_eq!(options.call_timeout(), Some(Duration::from_millis(1)));
        assert_eq!(options.reset_after(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn test_huge_durations_saturate() {
        let options = CircuitBreakerOptions::new()
            .timeout(Duration::MAX)
            .reset_timeout(Duration::MAX);

        assert_eq!(options.timeout_ms, u64::MAX);
        assert_eq!(options.reset_timeout_ms, i64::MAX);
        assert!(options.reset_after().is_some());
    }

    #[test]
    fn test_zero_timeout_means_no_deadline() {
        let options = CircuitBreakerOptions::new().timeout(Duration::ZERO);
        assert_eq!(options.call_timeout(), None);
    }
}
