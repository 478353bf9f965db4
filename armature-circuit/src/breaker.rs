//! Circuit breaker state machine.
//!
//! ## States
//!
//! - **Closed**: calls pass through, consecutive failures are counted
//! - **Open**: calls are rejected (or served by a fallback) without running
//! - **Half-Open**: a single probe call is let through to test recovery
//!
//! ## Example
//!
//! ```rust,ignore
//! use armature_circuit::{CircuitBreaker, CircuitBreakerOptions, CircuitBreakerError};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::create(
//!     "inventory",
//!     CircuitBreakerOptions::new()
//!         .max_failures(3)
//!         .timeout(Duration::from_secs(2))
//!         .reset_timeout(Duration::from_secs(10)),
//! );
//!
//! match breaker.execute(|| async { inventory.fetch().await }).await {
//!     Ok(items) => render(items),
//!     Err(CircuitBreakerError::Open(_)) => render_cached(),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

use crate::error::{BreakerFailure, CircuitBreakerError};
use crate::options::CircuitBreakerOptions;
use crate::promise::Promise;
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, calls pass through normally.
    Closed,
    /// Circuit is open, calls are rejected.
    Open,
    /// Circuit is half-open, a probe call is testing recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Observer invoked on state transitions and fallbacks.
pub type BreakerHandler = Arc<dyn Fn(&CircuitBreaker) + Send + Sync>;

/// Breaker-scoped fallback for results of type `T`.
pub type FallbackFn<T> = Arc<dyn Fn(&BreakerFailure) -> T + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum Event {
    Open,
    HalfOpen,
    Close,
    Fallback,
}

#[derive(Default)]
struct Handlers {
    open: Vec<BreakerHandler>,
    half_open: Vec<BreakerHandler>,
    close: Vec<BreakerHandler>,
    fallback: Vec<BreakerHandler>,
}

impl Handlers {
    fn for_event(&self, event: Event) -> &[BreakerHandler] {
        match event {
            Event::Open => &self.open,
            Event::HalfOpen => &self.half_open,
            Event::Close => &self.close,
            Event::Fallback => &self.fallback,
        }
    }
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    last_failure_at: Option<Instant>,
    probe_in_flight: bool,
}

#[derive(Default)]
struct Counters {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    rejections: AtomicU64,
    fallbacks: AtomicU64,
}

/// Circuit breaker protecting one named operation.
///
/// All state lives in the breaker itself. Applications that want one breaker
/// per name keep them in a [`CircuitBreakers`](crate::CircuitBreakers) map.
pub struct CircuitBreaker {
    name: String,
    options: CircuitBreakerOptions,
    inner: Mutex<BreakerState>,
    handlers: RwLock<Handlers>,
    fallbacks: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    counters: Counters,
    invocations: AtomicU64,
}

/// Admission ticket for one call.
///
/// Dropping an unsettled probe permit (caller gave up on the future) frees
/// the half-open slot so the next call can probe.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Permit<'_> {
    fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success(self.probe);
    }

    fn fail(mut self, timed_out: bool) {
        self.settled = true;
        self.breaker.record_failure(self.probe, timed_out);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.inner.lock().probe_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn create(name: impl Into<String>, options: CircuitBreakerOptions) -> Arc<Self> {
        let name = name.into();
        info!(
            name = %name,
            max_failures = options.max_failures,
            timeout_ms = options.timeout_ms,
            reset_timeout_ms = options.reset_timeout_ms,
            "Circuit breaker initialized"
        );

        Arc::new(Self {
            name,
            options,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                last_failure_at: None,
                probe_in_flight: false,
            }),
            handlers: RwLock::new(Handlers::default()),
            fallbacks: RwLock::new(HashMap::new()),
            counters: Counters::default(),
            invocations: AtomicU64::new(0),
        })
    }

    /// Circuit breaker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options the breaker was created with.
    pub fn options(&self) -> &CircuitBreakerOptions {
        &self.options
    }

    /// Current state. Does not trigger the open to half-open transition.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Current failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Time of the most recent failure, if any.
    pub fn last_failure_at(&self) -> Option<Instant> {
        self.inner.lock().last_failure_at
    }

    // Observers

    /// Register a handler called when the circuit opens.
    pub fn on_open<F>(&self, handler: F) -> &Self
    where
        F: Fn(&CircuitBreaker) + Send + Sync + 'static,
    {
        self.handlers.write().open.push(Arc::new(handler));
        self
    }

    /// Register a handler called when the circuit becomes half-open.
    pub fn on_half_open<F>(&self, handler: F) -> &Self
    where
        F: Fn(&CircuitBreaker) + Send + Sync + 'static,
    {
        self.handlers.write().half_open.push(Arc::new(handler));
        self
    }

    /// Register a handler called when the circuit closes.
    pub fn on_close<F>(&self, handler: F) -> &Self
    where
        F: Fn(&CircuitBreaker) + Send + Sync + 'static,
    {
        self.handlers.write().close.push(Arc::new(handler));
        self
    }

    /// Register a handler called each time a fallback runs.
    pub fn on_fallback<F>(&self, handler: F) -> &Self
    where
        F: Fn(&CircuitBreaker) + Send + Sync + 'static,
    {
        self.handlers.write().fallback.push(Arc::new(handler));
        self
    }

    /// Register the breaker-scoped fallback for calls producing `T`.
    ///
    /// One fallback is kept per result type; registering again replaces it.
    /// Call-scoped fallbacks take precedence.
    pub fn fallback<T, F>(&self, fallback: F) -> &Self
    where
        T: 'static,
        F: Fn(&BreakerFailure) -> T + Send + Sync + 'static,
    {
        let fallback: FallbackFn<T> = Arc::new(fallback);
        self.fallbacks
            .write()
            .insert(TypeId::of::<T>(), Arc::new(fallback));
        self
    }

    // Forced transitions

    /// Force the circuit open, bypassing the failure threshold.
    pub fn open(&self) {
        let opened = {
            let mut inner = self.inner.lock();
            self.trip(&mut inner)
        };
        if opened {
            self.fire(Event::Open);
        }
    }

    /// Force the circuit closed and zero the failure count.
    pub fn reset(&self) {
        let closed = {
            let mut inner = self.inner.lock();
            self.close(&mut inner)
        };
        if closed {
            self.fire(Event::Close);
        }
    }

    // Execution

    /// Run synchronous code under breaker control.
    ///
    /// No deadline is applied; a blocking call cannot be abandoned.
    pub fn execute_blocking<T, E, F>(&self, code: F) -> Result<T, CircuitBreakerError<E>>
    where
        T: 'static,
        E: fmt::Display,
        F: FnOnce() -> Result<T, E>,
    {
        self.run_blocking(code, None::<fn(CircuitBreakerError<E>) -> T>)
    }

    /// Run synchronous code with a call-scoped fallback.
    pub fn execute_blocking_with_fallback<T, E, F, FB>(
        &self,
        code: F,
        fallback: FB,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        T: 'static,
        E: fmt::Display,
        F: FnOnce() -> Result<T, E>,
        FB: FnOnce(CircuitBreakerError<E>) -> T,
    {
        self.run_blocking(code, Some(fallback))
    }

    /// Run a future under breaker control and the per-call deadline.
    ///
    /// On deadline the future is dropped and the call counts as a failure.
    ///
    /// ```
    /// # use armature_circuit::*;
    /// # tokio_test::block_on(async {
    /// let cb = CircuitBreaker::create("quotes", CircuitBreakerOptions::new().max_failures(1));
    ///
    /// let err = cb.execute(|| async { Err::<u32, _>("unavailable") }).await.unwrap_err();
    /// assert!(err.is_failure());
    /// assert_eq!(cb.state(), CircuitState::Open);
    /// # });
    /// ```
    pub async fn execute<T, E, F, Fut>(&self, code: F) -> Result<T, CircuitBreakerError<E>>
    where
        T: 'static,
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_async(code, None::<fn(CircuitBreakerError<E>) -> T>)
            .await
    }

    /// Run a future with a call-scoped fallback.
    pub async fn execute_with_fallback<T, E, F, Fut, FB>(
        &self,
        code: F,
        fallback: FB,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        T: 'static,
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce(CircuitBreakerError<E>) -> T,
    {
        self.run_async(code, Some(fallback)).await
    }

    /// Run callback-style code that reports its outcome through a [`Promise`].
    ///
    /// The promise may be completed from any task or thread. If it is not
    /// completed before the deadline the call counts as a timeout and any
    /// later completion is discarded. Without a deadline the call waits until
    /// the promise is settled.
    pub async fn execute_with_promise<T, E, F>(&self, code: F) -> Result<T, CircuitBreakerError<E>>
    where
        T: 'static,
        E: fmt::Display,
        F: FnOnce(Promise<T, E>),
    {
        self.run_promise(code, None::<fn(CircuitBreakerError<E>) -> T>)
            .await
    }

    /// Run callback-style code with a call-scoped fallback.
    pub async fn execute_with_promise_and_fallback<T, E, F, FB>(
        &self,
        code: F,
        fallback: FB,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        T: 'static,
        E: fmt::Display,
        F: FnOnce(Promise<T, E>),
        FB: FnOnce(CircuitBreakerError<E>) -> T,
    {
        self.run_promise(code, Some(fallback)).await
    }

    fn run_blocking<T, E, F, FB>(
        &self,
        code: F,
        fallback: Option<FB>,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        T: 'static,
        E: fmt::Display,
        F: FnOnce() -> Result<T, E>,
        FB: FnOnce(CircuitBreakerError<E>) -> T,
    {
        let Some(permit) = self.admit() else {
            return self.reject(fallback);
        };

        let outcome = code().map_err(CircuitBreakerError::Failure);
        self.settle(permit, outcome, fallback)
    }

    async fn run_async<T, E, F, Fut, FB>(
        &self,
        code: F,
        fallback: Option<FB>,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        T: 'static,
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce(CircuitBreakerError<E>) -> T,
    {
        let Some(permit) = self.admit() else {
            return self.reject(fallback);
        };

        let outcome = match self.options.call_timeout() {
            Some(deadline) => match tokio::time::timeout(deadline, code()).await {
                Ok(result) => result.map_err(CircuitBreakerError::Failure),
                Err(_) => Err(CircuitBreakerError::Timeout(deadline)),
            },
            None => code().await.map_err(CircuitBreakerError::Failure),
        };

        self.settle(permit, outcome, fallback)
    }

    async fn run_promise<T, E, F, FB>(
        &self,
        code: F,
        fallback: Option<FB>,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        T: 'static,
        E: fmt::Display,
        F: FnOnce(Promise<T, E>),
        FB: FnOnce(CircuitBreakerError<E>) -> T,
    {
        let Some(permit) = self.admit() else {
            return self.reject(fallback);
        };

        let invocation = self.invocations.fetch_add(1, Ordering::Relaxed);
        let (promise, slot, mut receiver) = Promise::channel(invocation);
        code(promise);

        let outcome = match self.options.call_timeout() {
            Some(deadline) => match tokio::time::timeout(deadline, &mut receiver).await {
                Ok(received) => Self::received(received, deadline),
                Err(_) if slot.claim() => {
                    debug!(name = %self.name, invocation, "Call timed out");
                    Err(CircuitBreakerError::Timeout(deadline))
                }
                // A completion claimed the slot as the deadline fired; its value is in flight.
                Err(_) => Self::received(receiver.await, deadline),
            },
            // The sender lives in the slot we hold, so the channel cannot close unsent.
            None => Self::received(receiver.await, std::time::Duration::ZERO),
        };

        self.settle(permit, outcome, fallback)
    }

    fn received<T, E>(
        received: Result<Result<T, E>, tokio::sync::oneshot::error::RecvError>,
        deadline: std::time::Duration,
    ) -> Result<T, CircuitBreakerError<E>> {
        match received {
            Ok(result) => result.map_err(CircuitBreakerError::Failure),
            Err(_) => Err(CircuitBreakerError::Timeout(deadline)),
        }
    }

    fn settle<T, E, FB>(
        &self,
        permit: Permit<'_>,
        outcome: Result<T, CircuitBreakerError<E>>,
        fallback: Option<FB>,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        T: 'static,
        E: fmt::Display,
        FB: FnOnce(CircuitBreakerError<E>) -> T,
    {
        match outcome {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(error) => {
                permit.fail(error.is_timeout());
                if self.options.fallback_on_failure {
                    self.fall_back(error, fallback)
                } else {
                    Err(error)
                }
            }
        }
    }

    fn reject<T, E, FB>(&self, fallback: Option<FB>) -> Result<T, CircuitBreakerError<E>>
    where
        T: 'static,
        E: fmt::Display,
        FB: FnOnce(CircuitBreakerError<E>) -> T,
    {
        self.counters.rejections.fetch_add(1, Ordering::Relaxed);
        debug!(name = %self.name, "Circuit breaker rejected call");
        self.fall_back(CircuitBreakerError::Open(self.name.clone()), fallback)
    }

    fn fall_back<T, E, FB>(
        &self,
        error: CircuitBreakerError<E>,
        fallback: Option<FB>,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        T: 'static,
        E: fmt::Display,
        FB: FnOnce(CircuitBreakerError<E>) -> T,
    {
        if let Some(fallback) = fallback {
            self.note_fallback();
            return Ok(fallback(error));
        }

        let scoped = self
            .fallbacks
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|f| f.downcast_ref::<FallbackFn<T>>().cloned());

        match scoped {
            Some(fallback) => {
                self.note_fallback();
                Ok(fallback(&BreakerFailure::from(&error)))
            }
            None => Err(error),
        }
    }

    fn note_fallback(&self) {
        self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        self.fire(Event::Fallback);
    }

    // State machine

    fn admit(&self) -> Option<Permit<'_>> {
        self.counters.calls.fetch_add(1, Ordering::Relaxed);

        let (probe, half_opened) = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => (false, false),
                CircuitState::Open => {
                    let due = match (self.options.reset_after(), inner.opened_at) {
                        (Some(reset), Some(opened_at)) => opened_at.elapsed() >= reset,
                        _ => false,
                    };
                    if !due {
                        return None;
                    }
                    debug!(name = %self.name, "Circuit breaker transitioning to HALF-OPEN");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    (true, true)
                }
                CircuitState::HalfOpen => {
                    if inner.probe_in_flight {
                        return None;
                    }
                    inner.probe_in_flight = true;
                    (true, false)
                }
            }
        };

        if half_opened {
            self.fire(Event::HalfOpen);
        }

        Some(Permit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    fn record_success(&self, probe: bool) {
        self.counters.successes.fetch_add(1, Ordering::Relaxed);

        let closed = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::HalfOpen if probe => self.close(&mut inner),
                CircuitState::Closed => {
                    // Consecutive-failure policy
                    inner.failure_count = 0;
                    false
                }
                _ => {
                    // State was forced while the call ran
                    debug!(name = %self.name, state = %inner.state, "Success recorded after forced transition");
                    if probe {
                        inner.probe_in_flight = false;
                    }
                    false
                }
            }
        };

        if closed {
            self.fire(Event::Close);
        }
    }

    fn record_failure(&self, probe: bool, timed_out: bool) {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
        }

        let opened = {
            let mut inner = self.inner.lock();
            inner.last_failure_at = Some(Instant::now());

            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count = inner.failure_count.saturating_add(1);
                    if inner.failure_count >= self.options.threshold() {
                        self.trip(&mut inner)
                    } else {
                        false
                    }
                }
                CircuitState::HalfOpen if probe => {
                    inner.failure_count = inner.failure_count.saturating_add(1);
                    self.trip(&mut inner)
                }
                _ => {
                    if probe {
                        inner.probe_in_flight = false;
                    }
                    false
                }
            }
        };

        if opened {
            self.fire(Event::Open);
        }
    }

    /// Move to open. Returns true if this was a transition.
    fn trip(&self, inner: &mut BreakerState) -> bool {
        inner.opened_at = Some(Instant::now());
        inner.probe_in_flight = false;
        if inner.state == CircuitState::Open {
            return false;
        }

        warn!(
            name = %self.name,
            failures = inner.failure_count,
            "Circuit breaker OPENED"
        );
        inner.state = CircuitState::Open;
        true
    }

    /// Move to closed. Returns true if this was a transition.
    fn close(&self, inner: &mut BreakerState) -> bool {
        inner.failure_count = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
        if inner.state == CircuitState::Closed {
            return false;
        }

        info!(name = %self.name, "Circuit breaker CLOSED");
        inner.state = CircuitState::Closed;
        true
    }

    fn fire(&self, event: Event) {
        let handlers: Vec<BreakerHandler> = self.handlers.read().for_event(event).to_vec();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(self))).is_err() {
                warn!(name = %self.name, event = ?event, "Circuit breaker handler panicked");
            }
        }
    }

    // Metrics

    /// Snapshot of the breaker's counters.
    pub fn stats(&self) -> CircuitBreakerStats {
        let (state, current_failure_count) = {
            let inner = self.inner.lock();
            (inner.state, inner.failure_count)
        };

        CircuitBreakerStats {
            name: self.name.clone(),
            state,
            current_failure_count,
            total_calls: self.counters.calls.load(Ordering::Relaxed),
            total_successes: self.counters.successes.load(Ordering::Relaxed),
            total_failures: self.counters.failures.load(Ordering::Relaxed),
            total_timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            total_rejections: self.counters.rejections.load(Ordering::Relaxed),
            total_fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .field("options", &self.options)
            .finish()
    }
}

/// Circuit breaker statistics.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    /// Circuit breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Current consecutive failure count.
    pub current_failure_count: u32,
    /// Calls attempted, including rejected ones.
    pub total_calls: u64,
    /// Calls that succeeded.
    pub total_successes: u64,
    /// Calls that failed, timeouts included.
    pub total_failures: u64,
    /// Calls that exceeded their deadline.
    pub total_timeouts: u64,
    /// Calls rejected by an open circuit.
    pub total_rejections: u64,
    /// Fallback invocations.
    pub total_fallbacks: u64,
}

impl CircuitBreakerStats {
    /// Calculate success rate (0.0 - 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            1.0
        } else {
            self.total_successes as f64 / self.total_calls as f64
        }
    }

    /// Calculate failure rate (0.0 - 1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_calls as f64
        }
    }
}
