use crate::core::event::EventHandle;
use crate::core::types::{EntityId, SimTime};
use serde::{Deserialize, Serialize};

/// Mutually exclusive server phase. Stopping is a separate flag layered on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerPhase {
    Idle,
    Working,
    Damaged,
    Recovering,
}

impl std::fmt::Display for ServerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServerPhase::Idle => "Idle",
            ServerPhase::Working => "Working",
            ServerPhase::Damaged => "Damaged",
            ServerPhase::Recovering => "Recovering",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingKind {
    Finished,
    Failed,
    Recovered,
}

impl PendingKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            PendingKind::Finished => "finished",
            PendingKind::Failed => "failed",
            PendingKind::Recovered => "recovered",
        }
    }
}

/// The one event a server is waiting for
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pending {
    pub handle: EventHandle,
    pub token: u64,
    pub kind: PendingKind,
    pub started_at: SimTime,
    pub scheduled_at: SimTime,
    /// Machining time still owed when the run started
    pub machining: f64,
}

/// Material and remaining machining time of a run cut short by a failure
/// or a cancelling stop
#[derive(Debug)]
pub(crate) struct InterruptedRun<M> {
    pub material: Vec<M>,
    pub remaining: f64,
}

/// Running counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    pub runs_started: u64,
    pub products_made: u64,
    pub failures: u64,
    pub recoveries: u64,
    pub scrapped_batches: u64,
    pub discarded_products: u64,
}

/// Payload of every server notification
#[derive(Debug, Clone, PartialEq)]
pub struct ServerNotice {
    pub server: EntityId,
    pub phase: ServerPhase,
    pub stopped: bool,
    pub time: SimTime,
}
