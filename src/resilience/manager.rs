//! # Circuit Breaker Manager
//!
//! Manages the circuit breakers of every cache backend and shard.
//! Provides centralized control and metrics aggregation.

use crate::config::CircuitBreakerConfig;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerMetrics, CircuitState, SystemCircuitBreakerMetrics,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Manager for multiple circuit breakers, keyed by component name
#[derive(Debug, Clone)]
pub struct CircuitBreakerManager {
    /// Collection of circuit breakers by component name
    circuit_breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,

    /// Configuration
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    /// Create new circuit breaker manager
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        info!(
            component_overrides = config.component_configs.len(),
            "Initializing circuit breaker manager"
        );

        Self {
            circuit_breakers: Arc::new(RwLock::new(HashMap::new())),
            config: config.clone(),
        }
    }

    /// Get or create circuit breaker for a component
    pub async fn get_circuit_breaker(&self, component_name: &str) -> Arc<CircuitBreaker> {
        // Try to get existing circuit breaker
        {
            let breakers = self.circuit_breakers.read().await;
            if let Some(breaker) = breakers.get(component_name) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.circuit_breakers.write().await;

        // Double-check pattern (another task might have created it)
        if let Some(breaker) = breakers.get(component_name) {
            return Arc::clone(breaker);
        }

        let component_config = self
            .config
            .config_for_component(component_name)
            .to_resilience_config();

        let breaker = Arc::new(CircuitBreaker::new(component_name, component_config));
        breakers.insert(component_name.to_string(), Arc::clone(&breaker));

        info!(
            component = component_name,
            total_circuit_breakers = breakers.len(),
            "Created new circuit breaker"
        );

        breaker
    }

    /// Get all circuit breaker names, sorted
    pub async fn list_components(&self) -> Vec<String> {
        let breakers = self.circuit_breakers.read().await;
        let mut names: Vec<String> = breakers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get metrics for a specific circuit breaker
    pub async fn get_component_metrics(
        &self,
        component_name: &str,
    ) -> Option<CircuitBreakerMetrics> {
        let breakers = self.circuit_breakers.read().await;
        breakers.get(component_name).map(|breaker| breaker.metrics())
    }

    /// Get system-wide circuit breaker metrics
    pub async fn get_system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();

        let breakers = self.circuit_breakers.read().await;
        for (name, breaker) in breakers.iter() {
            system_metrics.add_circuit_breaker(name.clone(), breaker.metrics());
        }

        system_metrics
    }

    /// Force open all circuit breakers (emergency stop)
    pub async fn force_open_all(&self) {
        warn!("🚨 Forcing all circuit breakers open (emergency stop)");

        let breakers = self.circuit_breakers.read().await;
        for breaker in breakers.values() {
            breaker.force_open();
        }
    }

    /// Force close all circuit breakers (emergency recovery)
    pub async fn force_close_all(&self) {
        warn!("🚨 Forcing all circuit breakers closed (emergency recovery)");

        let breakers = self.circuit_breakers.read().await;
        for breaker in breakers.values() {
            breaker.force_closed();
        }
    }

    /// Remove the breaker of a component and of all its shards
    ///
    /// Used when a backend is closed so a rebuilt backend starts closed.
    pub async fn remove_component(&self, component_name: &str) -> usize {
        let shard_prefix = format!("{component_name}{}", crate::config::SHARD_SUFFIX);
        let mut breakers = self.circuit_breakers.write().await;
        let before = breakers.len();
        breakers.retain(|name, _| name != component_name && !name.starts_with(&shard_prefix));
        let removed = before - breakers.len();

        if removed > 0 {
            info!(
                component = component_name,
                removed,
                remaining_count = breakers.len(),
                "🗑️ Removed circuit breakers"
            );
        }
        removed
    }

    /// Get count of circuit breakers by state
    pub async fn get_state_summary(&self) -> HashMap<CircuitState, usize> {
        self.get_system_metrics().await.count_by_state()
    }

    /// Check overall system health based on circuit breaker states
    pub async fn system_health_score(&self) -> f64 {
        self.get_system_metrics().await.health_score()
    }
}
