//! # Circuit Breaker Configuration
//!
//! Runtime settings of a single circuit breaker. For file/environment based
//! configuration see `crate::config::CircuitBreakerComponentConfig`, which
//! converts into this type.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Minimum requests in the current window before the circuit may open
    pub threshold: u32,

    /// Failure ratio of the current window that opens the circuit
    pub failure_rate: f64,

    /// Period after which closed-state counts reset; zero never resets
    pub interval: Duration,

    /// Time to wait in open state before probing
    pub timeout: Duration,

    /// Probe calls admitted in half-open state; that many consecutive
    /// successes close the circuit
    pub max_requests: u32,
}

impl CircuitBreakerConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.threshold == 0 {
            return Err("threshold must be greater than 0".to_string());
        }

        if !(self.failure_rate > 0.0 && self.failure_rate <= 1.0) {
            return Err("failure_rate must be in (0, 1]".to_string());
        }

        if self.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }

        if self.max_requests == 0 {
            return Err("max_requests must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 2,
            failure_rate: 0.5,
            interval: Duration::ZERO,
            timeout: Duration::from_secs(60),
            max_requests: 1,
        }
    }
}
