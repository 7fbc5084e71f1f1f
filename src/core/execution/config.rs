//! Configuration for flowsim simulation runs
//!
//! This module provides configuration types for controlling simulation execution behavior,
//! including run limits, seeding and how replications are spread over threads.

use crate::core::errors::{SimError, SimResult};
use serde::{Deserialize, Serialize};

/// How independent replications are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcurrencyMode {
    /// Replications run one after another on the calling thread
    Sequential,
    /// Replications are spread over a Rayon thread pool; each one is still single-threaded
    Rayon,
}

impl Default for ConcurrencyMode {
    fn default() -> Self {
        ConcurrencyMode::Sequential
    }
}

/// Configuration for one simulation run
///
/// This struct holds the master seed, optional stopping limits and the
/// replication settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Master seed; per-entity streams are derived from it in creation order
    pub seed: u64,
    /// Events scheduled after this time are not processed
    pub max_time: Option<f64>,
    /// Upper bound on processed events
    pub max_events: Option<u64>,
    /// Record every fired event in the scheduler trace
    pub record_trace: bool,
    /// The concurrency mode used by replications
    pub concurrency_mode: ConcurrencyMode,
    /// The size of the thread pool for parallel replications
    /// Only relevant when concurrency_mode is Rayon
    pub thread_pool_size: Option<usize>,
}

impl SimulationConfig {
    /// Create a new simulation configuration with default values
    ///
    /// Default configuration uses seed 42, no limits, trace recording on and Sequential mode
    pub fn new() -> Self {
        Self {
            seed: 42,
            max_time: None,
            max_events: None,
            record_trace: true,
            concurrency_mode: ConcurrencyMode::default(),
            thread_pool_size: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_time(mut self, max_time: f64) -> Self {
        self.max_time = Some(max_time);
        self
    }

    pub fn with_max_events(mut self, max_events: u64) -> Self {
        self.max_events = Some(max_events);
        self
    }

    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.record_trace = enabled;
        self
    }

    /// Set the concurrency mode for replications
    pub fn with_concurrency(mut self, mode: ConcurrencyMode) -> Self {
        self.concurrency_mode = mode;
        self
    }

    /// Set the thread pool size for parallel replications
    ///
    /// # Note
    /// This setting only affects execution when concurrency_mode is Rayon
    pub fn with_thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = Some(size);
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if let Some(max_time) = self.max_time {
            if !max_time.is_finite() || max_time < 0.0 {
                return Err(SimError::InvalidConfiguration(format!(
                    "max_time must be finite and non-negative, got {}",
                    max_time
                )));
            }
        }

        if self.thread_pool_size == Some(0) {
            return Err(SimError::InvalidConfiguration(
                "thread pool size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.max_time, None);
        assert!(config.record_trace);
        assert_eq!(config.concurrency_mode, ConcurrencyMode::Sequential);
        assert_eq!(config.thread_pool_size, None);
    }

    #[test]
    fn test_config_builder() {
        let config = SimulationConfig::new()
            .with_seed(7)
            .with_max_time(100.0)
            .with_max_events(50)
            .with_concurrency(ConcurrencyMode::Rayon)
            .with_thread_pool_size(4);

        assert_eq!(config.seed, 7);
        assert_eq!(config.max_time, Some(100.0));
        assert_eq!(config.max_events, Some(50));
        assert_eq!(config.concurrency_mode, ConcurrencyMode::Rayon);
        assert_eq!(config.thread_pool_size, Some(4));
    }

    #[test]
    fn test_validation() {
        assert!(SimulationConfig::default().validate().is_ok());
        assert!(SimulationConfig::new().with_max_time(-1.0).validate().is_err());
        assert!(SimulationConfig::new().with_thread_pool_size(0).validate().is_err());
    }
}
