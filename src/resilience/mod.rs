//! # Resilience Module
//!
//! Circuit breakers that isolate each cache backend, and each shard of a
//! sharded backend, so a failing store degrades the proxy to cache misses
//! instead of slowing every request down.
//!
//! ## Usage
//!
//! ```rust
//! use proxy_cache::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig {
//!     threshold: 2,
//!     failure_rate: 0.5,
//!     interval: Duration::ZERO,
//!     timeout: Duration::from_secs(60),
//!     max_requests: 1,
//! };
//!
//! let circuit_breaker = CircuitBreaker::new("global", config);
//!
//! let result = circuit_breaker
//!     .call(|| async { Ok::<&str, std::io::Error>("PONG") })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerError, CircuitState, Counts, StateTransition,
};
pub use config::CircuitBreakerConfig;
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
