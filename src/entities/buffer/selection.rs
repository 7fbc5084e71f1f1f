use serde::{Deserialize, Serialize};

/// Which item `Buffer::get` removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionPolicy {
    /// Smallest integer id (oldest, with monotonic ids)
    Fifo,
    /// Largest integer id
    Lifo,
    /// Smallest Priority
    Priority,
    /// Uniform over current contents, drawn from the buffer's own stream
    Random,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        SelectionPolicy::Fifo
    }
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SelectionPolicy::Fifo => "FIFO",
            SelectionPolicy::Lifo => "LIFO",
            SelectionPolicy::Priority => "Priority",
            SelectionPolicy::Random => "Random",
        };
        write!(f, "{}", name)
    }
}
