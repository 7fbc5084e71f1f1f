use super::event::EventHandle;
use super::types::{EntityId, SimTime};

/// Hard errors: modeling bugs and state-machine misuse.
///
/// Expected conditions (empty buffer, rejected item) never surface here;
/// they are logged and reported through return values instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("[{entity}] capacity {requested} is below current item count {count}")]
    CapacityBelowCount {
        entity: EntityId,
        requested: usize,
        count: usize,
    },

    #[error("invalid delay {0}: delays must be finite and non-negative")]
    InvalidDelay(f64),

    #[error("[{entity}] invalid duration {value}")]
    InvalidDuration { entity: EntityId, value: f64 },

    #[error("cannot cancel event {handle:?} scheduled at {scheduled} when current time is {now}")]
    EventNotInFuture {
        handle: EventHandle,
        scheduled: SimTime,
        now: SimTime,
    },

    #[error("event {0:?} is not pending")]
    UnknownEvent(EventHandle),

    #[error("[{entity}] server is busy ({phase})")]
    ServerBusy { entity: EntityId, phase: String },
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EntityKind;

    #[test]
    fn test_error_display() {
        let e = SimError::CapacityBelowCount {
            entity: EntityId::new("queue", EntityKind::Buffer),
            requested: 1,
            count: 3,
        };
        let s = e.to_string();
        assert!(s.contains("Buffer:queue"));
        assert!(s.contains("below"));
    }

    #[test]
    fn test_error_is_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(SimError::InvalidDelay(-1.0));
        assert!(e.to_string().contains("-1"));
    }
}
