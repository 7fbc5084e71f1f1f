use serde::{Deserialize, Serialize};

/// Coarse ordering bucket for events and items sharing a virtual time.
///
/// Declaration order is the processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriorityCategory {
    SimWorldBeforeOthers,
    LowLevelBeforeOthers,
    Default,
    LowLevelAfterOthers,
    SimWorldAfterOthers,
}

impl Default for PriorityCategory {
    fn default() -> Self {
        PriorityCategory::Default
    }
}

/// Ordering key: category first, then insertion order.
///
/// Insertion orders are handed out by the scheduler
/// (`EventScheduler::next_priority`), which keeps them unique per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priority {
    pub category: PriorityCategory,
    pub insertion_order: u64,
}

impl Priority {
    pub fn new(category: PriorityCategory, insertion_order: u64) -> Self {
        Self {
            category,
            insertion_order,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}#{}", self.category, self.insertion_order)
    }
}

/// Monotonic insertion-order source
#[derive(Debug, Clone, Default)]
pub(crate) struct PriorityCounter {
    next: u64,
}

impl PriorityCounter {
    pub(crate) fn next(&mut self, category: PriorityCategory) -> Priority {
        let priority = Priority::new(category, self.next);
        self.next += 1;
        priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_dominates_insertion_order() {
        let early = Priority::new(PriorityCategory::SimWorldBeforeOthers, 100);
        let late = Priority::new(PriorityCategory::LowLevelAfterOthers, 1);
        assert!(early < late);
    }

    #[test]
    fn test_insertion_order_breaks_ties() {
        let mut counter = PriorityCounter::default();
        let a = counter.next(PriorityCategory::Default);
        let b = counter.next(PriorityCategory::Default);
        assert!(a < b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_category_order() {
        use PriorityCategory::*;
        let mut cats = vec![SimWorldAfterOthers, Default, LowLevelBeforeOthers, SimWorldBeforeOthers, LowLevelAfterOthers];
        cats.sort();
        assert_eq!(
            cats,
            vec![SimWorldBeforeOthers, LowLevelBeforeOthers, Default, LowLevelAfterOthers, SimWorldAfterOthers]
        );
    }
}
