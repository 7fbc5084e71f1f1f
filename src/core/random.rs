//! Seeded random streams and the duration distributions sampled from them.

use super::errors::{SimError, SimResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution as _, Exp, Gamma, LogNormal, Normal, Triangular};
use serde::{Deserialize, Serialize};

/// Sampling distribution for durations and intervals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    Constant(f64),
    Uniform { low: f64, high: f64 },
    Exponential { mean: f64 },
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
    Gamma { shape: f64, scale: f64 },
}

impl Distribution {
    pub fn constant(value: f64) -> Self {
        Distribution::Constant(value)
    }

    pub fn exponential(mean: f64) -> Self {
        Distribution::Exponential { mean }
    }

    pub fn uniform(low: f64, high: f64) -> Self {
        Distribution::Uniform { low, high }
    }

    /// Memoryless distributions, for which carrying a remaining interval
    /// forward is exact
    pub fn is_memoryless(&self) -> bool {
        matches!(self, Distribution::Exponential { .. })
    }

    pub fn validate(&self) -> SimResult<()> {
        let ok = match *self {
            Distribution::Constant(v) => v.is_finite(),
            Distribution::Uniform { low, high } => low.is_finite() && high.is_finite() && low <= high,
            Distribution::Exponential { mean } => mean.is_finite() && mean > 0.0,
            Distribution::Normal { mean, std_dev } => mean.is_finite() && std_dev.is_finite() && std_dev >= 0.0,
            Distribution::LogNormal { mu, sigma } => mu.is_finite() && sigma.is_finite() && sigma >= 0.0,
            Distribution::Triangular { min, mode, max } => {
                min.is_finite() && max.is_finite() && min <= mode && mode <= max && min < max
            }
            Distribution::Gamma { shape, scale } => {
                shape.is_finite() && scale.is_finite() && shape > 0.0 && scale > 0.0
            }
        };
        if ok {
            Ok(())
        } else {
            Err(SimError::InvalidConfiguration(format!(
                "invalid distribution parameters: {:?}",
                self
            )))
        }
    }
}

/// Independently seeded, reproducible random stream owned by one entity
#[derive(Debug, Clone)]
pub struct RandomSource {
    seed: u64,
    rng: StdRng,
}

impl RandomSource {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Restart the stream from its seed
    pub fn reseed(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    /// Uniform index in `0..len`; `len` must be non-zero
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.gen()
    }

    pub fn sample(&mut self, distribution: &Distribution) -> SimResult<f64> {
        let value = match *distribution {
            Distribution::Constant(v) => v,
            Distribution::Uniform { low, high } => {
                if low == high {
                    low
                } else {
                    self.rng.gen_range(low..high)
                }
            }
            Distribution::Exponential { mean } => Exp::new(1.0 / mean)
                .map_err(|e| invalid(distribution, e))?
                .sample(&mut self.rng),
            Distribution::Normal { mean, std_dev } => Normal::new(mean, std_dev)
                .map_err(|e| invalid(distribution, e))?
                .sample(&mut self.rng),
            Distribution::LogNormal { mu, sigma } => LogNormal::new(mu, sigma)
                .map_err(|e| invalid(distribution, e))?
                .sample(&mut self.rng),
            Distribution::Triangular { min, mode, max } => Triangular::new(min, max, mode)
                .map_err(|e| invalid(distribution, e))?
                .sample(&mut self.rng),
            Distribution::Gamma { shape, scale } => Gamma::new(shape, scale)
                .map_err(|e| invalid(distribution, e))?
                .sample(&mut self.rng),
        };
        Ok(value)
    }
}

fn invalid(distribution: &Distribution, err: impl std::fmt::Display) -> SimError {
    SimError::InvalidConfiguration(format!("{:?}: {}", distribution, err))
}
