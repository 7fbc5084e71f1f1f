use super::selection::SelectionPolicy;
use super::storage::ItemId;
use crate::core::errors::{SimError, SimResult};
use crate::core::priority::Priority;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    pub capacity: usize,
    pub policy: SelectionPolicy,
    /// Seed for the Random policy stream; derived from the master seed when absent
    pub seed: Option<u64>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: usize::MAX,
            policy: SelectionPolicy::Fifo,
            seed: None,
        }
    }
}

impl BufferConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.capacity == 0 {
            return Err(SimError::InvalidConfiguration(
                "buffer capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Optional overrides for one `put`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutOptions {
    /// Caller-chosen integer id. Ids that are not increasing break FIFO/LIFO order.
    pub id: Option<ItemId>,
    pub key: Option<String>,
    pub priority: Option<Priority>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: ItemId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}
