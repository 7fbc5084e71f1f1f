pub mod core;
pub mod entities;

// Re-export commonly used types
pub use crate::core::component::{Identifiable, Resettable};
pub use crate::core::connections::{ItemSink, ItemSource, Offer};
pub use crate::core::errors::{SimError, SimResult};
pub use crate::core::event::{EventHandle, SimEvent, TraceRecord};
pub use crate::core::event_scheduler::{EventScheduler, SimulationObserver};
pub use crate::core::execution::{run_replications, ConcurrencyMode, Replication, SimulationConfig};
pub use crate::core::priority::{Priority, PriorityCategory};
pub use crate::core::random::{Distribution, RandomSource};
pub use crate::core::signal::Signal;
pub use crate::core::types::{EntityId, EntityKind, SimTime};
pub use crate::entities::{
    Buffer, BufferConfig, Delay, PutOptions, SelectionPolicy, Server, ServerOptions, ServerPhase, Sink,
};
