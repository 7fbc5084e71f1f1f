use crate::core::priority::Priority;
use std::collections::{BTreeMap, HashMap};

/// Integer item id inside one buffer
pub type ItemId = u64;

pub(crate) type Slot = usize;

#[derive(Debug)]
pub(crate) struct StoredItem<T> {
    pub item: T,
    pub id: ItemId,
    pub key: String,
    pub priority: Priority,
}

/// Slot arena holding the items, plus the lookup indexes over slots.
///
/// Every mutation goes through `insert`/`remove`/`clear`, which touch the
/// arena and all three indexes together, so an item is either visible
/// through every lookup or through none.
#[derive(Debug)]
pub(crate) struct ItemStore<T> {
    slots: Vec<Option<StoredItem<T>>>,
    free: Vec<Slot>,
    by_id: BTreeMap<ItemId, Slot>,
    by_key: HashMap<String, Slot>,
    by_priority: BTreeMap<(Priority, ItemId), Slot>,
}

impl<T> ItemStore<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_id: BTreeMap::new(),
            by_key: HashMap::new(),
            by_priority: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn contains_id(&self, id: ItemId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Insert an item; an id or key already present hands the item back untouched
    pub fn insert(&mut self, stored: StoredItem<T>) -> Result<Slot, StoredItem<T>> {
        if self.contains_id(stored.id) || self.contains_key(&stored.key) {
            return Err(stored);
        }

        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.by_id.insert(stored.id, slot);
        self.by_key.insert(stored.key.clone(), slot);
        self.by_priority.insert((stored.priority, stored.id), slot);
        self.slots[slot] = Some(stored);
        Ok(slot)
    }

    pub fn remove(&mut self, slot: Slot) -> Option<StoredItem<T>> {
        let stored = self.slots.get_mut(slot)?.take()?;
        self.by_id.remove(&stored.id);
        self.by_key.remove(&stored.key);
        self.by_priority.remove(&(stored.priority, stored.id));
        self.free.push(slot);
        Some(stored)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.by_id.clear();
        self.by_key.clear();
        self.by_priority.clear();
    }

    pub fn get(&self, slot: Slot) -> Option<&StoredItem<T>> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn slot_by_id(&self, id: ItemId) -> Option<Slot> {
        self.by_id.get(&id).copied()
    }

    pub fn slot_by_key(&self, key: &str) -> Option<Slot> {
        self.by_key.get(key).copied()
    }

    pub fn lowest_id(&self) -> Option<Slot> {
        self.by_id.values().next().copied()
    }

    pub fn highest_id(&self) -> Option<Slot> {
        self.by_id.values().next_back().copied()
    }

    pub fn lowest_priority(&self) -> Option<Slot> {
        self.by_priority.values().next().copied()
    }

    /// The `n`-th item in id order
    pub fn nth_by_id(&self, n: usize) -> Option<Slot> {
        self.by_id.values().nth(n).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.by_id.keys().copied()
    }

    /// Cross-check the arena against every index
    pub fn is_consistent(&self) -> bool {
        let live = self.slots.iter().filter(|s| s.is_some()).count();
        if live != self.by_id.len() || live != self.by_key.len() || live != self.by_priority.len() {
            return false;
        }
        if self.slots.len() != live + self.free.len() {
            return false;
        }

        self.slots.iter().enumerate().all(|(slot, stored)| match stored {
            Some(s) => {
                self.by_id.get(&s.id) == Some(&slot)
                    && self.by_key.get(&s.key) == Some(&slot)
                    && self.by_priority.get(&(s.priority, s.id)) == Some(&slot)
            }
            None => self.free.contains(&slot),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::priority::PriorityCategory;

    fn stored(id: ItemId, order: u64) -> StoredItem<&'static str> {
        StoredItem {
            item: "x",
            id,
            key: format!("k{}", id),
            priority: Priority::new(PriorityCategory::Default, order),
        }
    }

    #[test]
    fn test_insert_and_remove_keep_indexes_aligned() {
        let mut store = ItemStore::new();
        let a = store.insert(stored(1, 10)).unwrap();
        let b = store.insert(stored(2, 5)).unwrap();
        assert!(store.is_consistent());
        assert_eq!(store.lowest_id(), Some(a));
        assert_eq!(store.highest_id(), Some(b));
        assert_eq!(store.lowest_priority(), Some(b));

        let removed = store.remove(a).unwrap();
        assert_eq!(removed.id, 1);
        assert!(!store.contains_id(1));
        assert!(!store.contains_key("k1"));
        assert!(store.is_consistent());
    }

    #[test]
    fn test_duplicate_id_or_key_rejected() {
        let mut store = ItemStore::new();
        store.insert(stored(1, 0)).unwrap();
        assert!(store.insert(stored(1, 1)).is_err());

        let mut clash = stored(2, 2);
        clash.key = "k1".to_string();
        assert!(store.insert(clash).is_err());
        assert_eq!(store.len(), 1);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_slots_are_reused() {
        let mut store = ItemStore::new();
        let a = store.insert(stored(1, 0)).unwrap();
        store.remove(a);
        let b = store.insert(stored(2, 1)).unwrap();
        assert_eq!(a, b);
        assert!(store.is_consistent());
    }
}
