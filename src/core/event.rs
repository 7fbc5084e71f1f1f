use super::errors::SimResult;
use super::event_scheduler::EventScheduler;
use super::priority::{Priority, PriorityCategory};
use super::types::{EntityId, SimTime};
use serde::{Deserialize, Serialize};

/// Deferred work executed when an event fires
pub type Action = Box<dyn FnOnce(&mut EventScheduler) -> SimResult<()>>;

/// Handle to a scheduled event, used for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventHandle(pub(crate) u64);

impl EventHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A typed event instance: who raised it, what it is, how it is ordered
/// among events at the same time, and what it does.
pub struct SimEvent {
    pub source: EntityId,
    pub label: String,
    pub category: PriorityCategory,
    pub(crate) action: Action,
}

impl SimEvent {
    pub fn new<F>(source: EntityId, label: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(&mut EventScheduler) -> SimResult<()> + 'static,
    {
        Self {
            source,
            label: label.into(),
            category: PriorityCategory::Default,
            action: Box::new(action),
        }
    }

    pub fn with_category(mut self, category: PriorityCategory) -> Self {
        self.category = category;
        self
    }
}

impl std::fmt::Debug for SimEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEvent")
            .field("source", &self.source)
            .field("label", &self.label)
            .field("category", &self.category)
            .finish()
    }
}

/// One fired event, as recorded in the scheduler trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub time: SimTime,
    pub priority: Priority,
    pub source: EntityId,
    pub label: String,
}

impl std::fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] {} {}", self.time, self.priority, self.source, self.label)
    }
}
