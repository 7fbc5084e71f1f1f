use super::errors::SimResult;
use super::event_scheduler::EventScheduler;
use super::types::EntityId;

/// Entities with a stable identity
pub trait Identifiable {
    fn entity_id(&self) -> &EntityId;
}

/// Entities that can be returned to their initial state between runs
pub trait Resettable {
    fn reset(&self, sched: &mut EventScheduler) -> SimResult<()>;
}
