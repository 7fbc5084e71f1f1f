pub mod config;
pub mod replication;

// Re-export commonly used types
pub use config::{ConcurrencyMode, SimulationConfig};
pub use replication::{replication_seeds, run_replications, Replication};
