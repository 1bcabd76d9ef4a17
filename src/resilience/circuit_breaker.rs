//! # Circuit Breaker Implementation
//!
//! Fault isolation for remote calls, with three states: Closed (normal
//! operation, counting), Open (failing fast) and Half-Open (admitting a
//! limited number of probe calls).
//!
//! Counts live in a window identified by a generation number. Every state
//! change, and every `interval` while closed, starts a new generation; results
//! of calls that started in an older generation are ignored. A call whose
//! future is dropped before it finishes is recorded as a failure.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the state transition channel; slow subscribers lose the oldest events
const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - limited calls allowed to probe the backend
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open (or half-open with no probe slot left), the call was not made
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Notification published on every state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub name: String,
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Counts of the current generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    /// End of the current closed window or of the open period
    expiry: Option<Instant>,
    metrics: CircuitBreakerMetrics,
}

/// Core circuit breaker implementation
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    /// State, counts and metrics behind one lock
    inner: Mutex<BreakerInner>,

    transitions: broadcast::Sender<StateTransition>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            threshold = config.threshold,
            failure_rate = config.failure_rate,
            interval_seconds = config.interval.as_secs(),
            timeout_seconds = config.timeout.as_secs(),
            max_requests = config.max_requests,
            "🛡️ Circuit breaker initialized"
        );

        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        let expiry = closed_window_end(&config, Instant::now());

        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
                metrics: CircuitBreakerMetrics::new(),
            }),
            transitions,
        }
    }

    /// Get current circuit state
    ///
    /// Applies time-based transitions (open → half-open after `timeout`).
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now()).0
    }

    /// Counts of the current generation
    pub fn counts(&self) -> Counts {
        let mut inner = self.inner.lock();
        self.current_state(&mut inner, Instant::now());
        inner.counts
    }

    /// Receive a `StateTransition` for every state change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions.subscribe()
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = match self.before_call() {
            Some(generation) => generation,
            None => {
                return Err(CircuitBreakerError::CircuitOpen {
                    component: self.name.clone(),
                })
            }
        };

        let admission = Admission {
            breaker: self,
            generation,
            start_time: Instant::now(),
            settled: false,
        };
        let result = operation().await;
        admission.settle(result.is_ok());

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Admit or reject a call; returns the generation it belongs to
    fn before_call(&self) -> Option<u64> {
        let mut inner = self.inner.lock();
        let (state, generation) = self.current_state(&mut inner, Instant::now());

        let admitted = match state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => inner.counts.requests < self.config.max_requests,
        };

        if !admitted {
            inner.metrics.rejected_count += 1;
            debug!(component = %self.name, state = %state, "⛔ Call rejected");
            return None;
        }

        inner.counts.on_request();
        Some(generation)
    }

    /// Record the outcome of a call admitted in `before_generation`
    fn after_call(&self, before_generation: u64, success: bool, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.total_duration += duration;
        if success {
            inner.metrics.success_count += 1;
            inner.metrics.consecutive_failures = 0;
        } else {
            inner.metrics.failure_count += 1;
            inner.metrics.consecutive_failures += 1;
        }

        let now = Instant::now();
        let (state, generation) = self.current_state(&mut inner, now);
        if generation != before_generation {
            debug!(component = %self.name, "Ignoring result from a previous generation");
            return;
        }

        if success {
            self.on_success(&mut inner, state, now);
        } else {
            self.on_failure(&mut inner, state, now);
        }
    }

    fn on_success(&self, inner: &mut BreakerInner, state: CircuitState, now: Instant) {
        match state {
            CircuitState::Closed => inner.counts.on_success(),
            CircuitState::HalfOpen => {
                inner.counts.on_success();
                if inner.counts.consecutive_successes >= self.config.max_requests {
                    self.set_state(inner, CircuitState::Closed, now);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut BreakerInner, state: CircuitState, now: Instant) {
        match state {
            CircuitState::Closed => {
                inner.counts.on_failure();
                if self.ready_to_trip(&inner.counts) {
                    self.set_state(inner, CircuitState::Open, now);
                }
            }
            // Any failure in half-open state immediately opens circuit
            CircuitState::HalfOpen => self.set_state(inner, CircuitState::Open, now),
            CircuitState::Open => {}
        }
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.config.threshold
            && counts.requests > 0
            && f64::from(counts.total_failures) / f64::from(counts.requests)
                >= self.config.failure_rate
    }

    /// Resolve time-based transitions and return the state and generation
    fn current_state(&self, inner: &mut BreakerInner, now: Instant) -> (CircuitState, u64) {
        match inner.state {
            CircuitState::Closed => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.new_generation(inner, now);
                }
            }
            CircuitState::Open => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.set_state(inner, CircuitState::HalfOpen, now);
                }
            }
            CircuitState::HalfOpen => {}
        }
        (inner.state, inner.generation)
    }

    fn set_state(&self, inner: &mut BreakerInner, state: CircuitState, now: Instant) {
        if inner.state == state {
            return;
        }

        let from = inner.state;
        inner.state = state;
        inner.metrics.state_transitions += 1;
        self.new_generation(inner, now);

        match state {
            CircuitState::Open => warn!(
                component = %self.name,
                from = %from,
                to = %state,
                timeout_seconds = self.config.timeout.as_secs(),
                "🔴 Circuit breaker opened (failing fast)"
            ),
            CircuitState::HalfOpen => warn!(
                component = %self.name,
                from = %from,
                to = %state,
                max_requests = self.config.max_requests,
                "🟡 Circuit breaker half-open (probing)"
            ),
            CircuitState::Closed => warn!(
                component = %self.name,
                from = %from,
                to = %state,
                "🟢 Circuit breaker closed (recovered)"
            ),
        }

        // No subscribers is fine
        let _ = self.transitions.send(StateTransition {
            name: self.name.clone(),
            from,
            to: state,
        });
    }

    fn new_generation(&self, inner: &mut BreakerInner, now: Instant) {
        inner.generation += 1;
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed => closed_window_end(&self.config, now),
            CircuitState::Open => Some(now + self.config.timeout),
            CircuitState::HalfOpen => None,
        };
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut inner = self.inner.lock();
        self.set_state(&mut inner, CircuitState::Open, Instant::now());
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        self.set_state(&mut inner, CircuitState::Closed, Instant::now());
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let mut inner = self.inner.lock();
        let (state, _) = self.current_state(&mut inner, Instant::now());
        let mut snapshot = inner.metrics.clone();

        // Add current state information
        snapshot.current_state = state;

        // Calculate derived metrics
        if snapshot.total_calls > 0 {
            snapshot.failure_rate = snapshot.failure_count as f64 / snapshot.total_calls as f64;
            snapshot.success_rate = snapshot.success_count as f64 / snapshot.total_calls as f64;
            snapshot.average_duration = snapshot
                .total_duration
                .checked_div(snapshot.total_calls as u32)
                .unwrap_or_default();
        }

        snapshot
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        let metrics = self.metrics();
        if metrics.current_state != CircuitState::Closed {
            return false;
        }

        if metrics.total_calls < 10 {
            // Too few calls to determine health
            return true;
        }

        // Consider healthy if failure rate is below 10%
        metrics.failure_rate < 0.1
    }
}

/// An admitted call whose outcome is still pending
///
/// Dropping it unsettled (the caller abandoned the `call` future) records a
/// failure, which hands a half-open probe slot back by reopening the circuit.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    start_time: Instant,
    settled: bool,
}

impl Admission<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker
            .after_call(self.generation, success, self.start_time.elapsed());
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                component = %self.breaker.name,
                "⚠️ Call abandoned before completion, counted as failure"
            );
            self.breaker
                .after_call(self.generation, false, self.start_time.elapsed());
        }
    }
}

fn closed_window_end(config: &CircuitBreakerConfig, now: Instant) -> Option<Instant> {
    if config.interval.is_zero() {
        None
    } else {
        Some(now + config.interval)
    }
}
