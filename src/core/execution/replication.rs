use super::config::{ConcurrencyMode, SimulationConfig};
use crate::core::errors::{SimError, SimResult};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Result of one independent run of a model
#[derive(Debug)]
pub struct Replication<R> {
    pub index: usize,
    pub seed: u64,
    pub result: SimResult<R>,
}

/// Seeds for `count` replications, derived from the master seed
pub fn replication_seeds(master_seed: u64, count: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(master_seed);
    (0..count).map(|_| rng.gen()).collect()
}

/// Run `count` independent replications of `model`.
///
/// `model` receives a copy of `config` carrying the replication's seed and
/// must build its own scheduler and entities; nothing is shared between
/// replications. Results come back in replication order whatever the
/// concurrency mode.
pub fn run_replications<R, F>(config: &SimulationConfig, count: usize, model: F) -> SimResult<Vec<Replication<R>>>
where
    R: Send,
    F: Fn(SimulationConfig) -> SimResult<R> + Send + Sync,
{
    config.validate()?;
    let seeds = replication_seeds(config.seed, count);
    info!(
        "Running {} replications ({:?}) from master seed {}",
        count, config.concurrency_mode, config.seed
    );

    let run_one = |(index, seed): (usize, u64)| Replication {
        index,
        seed,
        result: model(config.clone().with_seed(seed)),
    };

    let replications: Vec<Replication<R>> = match config.concurrency_mode {
        ConcurrencyMode::Sequential => seeds.into_iter().enumerate().map(run_one).collect(),
        ConcurrencyMode::Rayon => {
            let mut builder = rayon::ThreadPoolBuilder::new();
            if let Some(size) = config.thread_pool_size {
                builder = builder.num_threads(size);
            }
            let pool = builder
                .build()
                .map_err(|e| SimError::InvalidConfiguration(format!("thread pool: {}", e)))?;
            pool.install(|| seeds.into_par_iter().enumerate().map(run_one).collect())
        }
    };
    Ok(replications)
}
