use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The kind of entity an identifier belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Model,
    Buffer,
    Server,
    Delay,
    Sink,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Model => "Model",
            EntityKind::Buffer => "Buffer",
            EntityKind::Server => "Server",
            EntityKind::Delay => "Delay",
            EntityKind::Sink => "Sink",
        };
        write!(f, "{}", name)
    }
}

/// Entity identifier with kind information
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub(crate) name: String,
    pub(crate) kind: EntityKind,
}

impl EntityId {
    /// Create a new entity ID
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Identifier used for events scheduled by model code rather than an entity
    pub fn model() -> Self {
        Self::new("model", EntityKind::Model)
    }

    /// Get the raw name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the entity kind
    pub fn kind(&self) -> EntityKind {
        self.kind
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// A point in virtual time.
///
/// Always finite and non-negative; construction goes through
/// [`SimTime::new`] which rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimTime(f64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0.0);

    /// Create a time value, `None` if `t` is negative, NaN or infinite
    pub fn new(t: f64) -> Option<Self> {
        if t.is_finite() && t >= 0.0 {
            Some(SimTime(t))
        } else {
            None
        }
    }

    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// The time `delay` after `self`, `None` if the delay is not a valid duration
    pub fn after(self, delay: f64) -> Option<Self> {
        if !delay.is_finite() || delay < 0.0 {
            return None;
        }
        SimTime::new(self.0 + delay)
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t={:.3}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_display() {
        let id = EntityId::new("press", EntityKind::Server);
        assert_eq!(id.to_string(), "Server:press");
        assert_eq!(id.name(), "press");
        assert_eq!(id.kind(), EntityKind::Server);
    }

    #[test]
    fn test_sim_time_rejects_invalid() {
        assert!(SimTime::new(-1.0).is_none());
        assert!(SimTime::new(f64::NAN).is_none());
        assert!(SimTime::new(f64::INFINITY).is_none());
        assert_eq!(SimTime::new(2.5).map(SimTime::as_f64), Some(2.5));
    }

    #[test]
    fn test_sim_time_after() {
        let t = SimTime::new(1.0).unwrap();
        assert_eq!(t.after(4.0).unwrap().as_f64(), 5.0);
        assert!(t.after(-0.5).is_none());
        assert!(t < t.after(0.1).unwrap());
    }
}
