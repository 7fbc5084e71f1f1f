pub mod component;
pub mod connections;
pub mod errors;
pub mod event;
pub mod event_scheduler;
pub mod execution;
pub mod priority;
pub mod random;
pub mod signal;
pub mod types;
