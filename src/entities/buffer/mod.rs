//! Capacity-bounded item store with four synchronized lookups (integer id,
//! string key, priority, and the item arena itself) and a selection policy
//! deciding which item `get` hands out.

pub mod config;
pub mod selection;
pub(crate) mod storage;

pub use config::{BufferConfig, PutOptions};
pub use selection::SelectionPolicy;
pub use storage::ItemId;

use crate::core::component::{Identifiable, Resettable};
use crate::core::connections::{Inlet, ItemSink, Offer};
use crate::core::errors::{SimError, SimResult};
use crate::core::event_scheduler::EventScheduler;
use crate::core::priority::{Priority, PriorityCategory};
use crate::core::random::RandomSource;
use crate::core::signal::Signal;
use crate::core::types::{EntityId, EntityKind, SimTime};
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use storage::{ItemStore, Slot, StoredItem};
use uuid::Uuid;

/// Payload of every buffer notification
#[derive(Debug, Clone, PartialEq)]
pub struct BufferNotice {
    pub buffer: EntityId,
    pub item_id: Option<ItemId>,
    pub count: usize,
    pub time: SimTime,
}

struct BufferState<T> {
    initial: BufferConfig,
    capacity: usize,
    policy: SelectionPolicy,
    store: ItemStore<T>,
    next_id: ItemId,
    rng: RandomSource,
    key_namespace: u64,
}

fn select<T>(store: &ItemStore<T>, policy: SelectionPolicy, rng: &mut RandomSource) -> Option<Slot> {
    match policy {
        SelectionPolicy::Fifo => store.lowest_id(),
        SelectionPolicy::Lifo => store.highest_id(),
        SelectionPolicy::Priority => store.lowest_priority(),
        SelectionPolicy::Random => {
            if store.is_empty() {
                None
            } else {
                let n = rng.index(store.len());
                store.nth_by_id(n)
            }
        }
    }
}

struct BufferInner<T> {
    id: EntityId,
    state: RefCell<BufferState<T>>,
    item_received: Signal<BufferNotice>,
    buffer_full: Signal<BufferNotice>,
    buffer_empty: Signal<BufferNotice>,
    item_not_accepted: Signal<BufferNotice>,
}

/// Shared handle to a buffer; clones refer to the same buffer.
pub struct Buffer<T> {
    inner: Rc<BufferInner<T>>,
}

impl<T> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Buffer<T> {
    pub fn new(sched: &mut EventScheduler, name: impl Into<String>, config: BufferConfig) -> SimResult<Self> {
        config.validate()?;
        let id = EntityId::new(name, EntityKind::Buffer);
        let rng = sched.random_stream(config.seed);
        let key_namespace = sched.derive_seed();
        info!(
            "[{}] created (capacity {}, policy {})",
            id, config.capacity, config.policy
        );

        let state = BufferState {
            capacity: config.capacity,
            policy: config.policy,
            initial: config,
            store: ItemStore::new(),
            next_id: 0,
            rng,
            key_namespace,
        };
        Ok(Self {
            inner: Rc::new(BufferInner {
                id,
                state: RefCell::new(state),
                item_received: Signal::new("item_received"),
                buffer_full: Signal::new("buffer_full"),
                buffer_empty: Signal::new("buffer_empty"),
                item_not_accepted: Signal::new("item_not_accepted"),
            }),
        })
    }

    pub fn id(&self) -> &EntityId {
        &self.inner.id
    }

    pub fn capacity(&self) -> usize {
        self.inner.state.borrow().capacity
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.inner.state.borrow().policy
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        let state = self.inner.state.borrow();
        state.store.len() >= state.capacity
    }

    pub fn contains_id(&self, id: ItemId) -> bool {
        self.inner.state.borrow().store.contains_id(id)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.state.borrow().store.contains_key(key)
    }

    /// Ids of the stored items in ascending order
    pub fn ids(&self) -> Vec<ItemId> {
        self.inner.state.borrow().store.ids().collect()
    }

    pub fn priority_of(&self, id: ItemId) -> Option<Priority> {
        let state = self.inner.state.borrow();
        let slot = state.store.slot_by_id(id)?;
        state.store.get(slot).map(|s| s.priority)
    }

    pub fn key_of(&self, id: ItemId) -> Option<String> {
        let state = self.inner.state.borrow();
        let slot = state.store.slot_by_id(id)?;
        state.store.get(slot).map(|s| s.key.clone())
    }

    /// Diagnostic: every stored item is reachable through every lookup
    pub fn is_consistent(&self) -> bool {
        let state = self.inner.state.borrow();
        state.store.is_consistent() && state.store.len() <= state.capacity
    }

    /// Change the capacity; shrinking below the current count is an error
    pub fn set_capacity(&self, capacity: usize) -> SimResult<()> {
        let mut state = self.inner.state.borrow_mut();
        let count = state.store.len();
        if capacity == 0 || capacity < count {
            return Err(SimError::CapacityBelowCount {
                entity: self.inner.id.clone(),
                requested: capacity,
                count,
            });
        }
        state.capacity = capacity;
        Ok(())
    }

    pub fn set_policy(&self, policy: SelectionPolicy) {
        self.inner.state.borrow_mut().policy = policy;
    }

    pub fn on_item_received(&self) -> &Signal<BufferNotice> {
        &self.inner.item_received
    }

    pub fn on_buffer_full(&self) -> &Signal<BufferNotice> {
        &self.inner.buffer_full
    }

    pub fn on_buffer_empty(&self) -> &Signal<BufferNotice> {
        &self.inner.buffer_empty
    }

    pub fn on_item_not_accepted(&self) -> &Signal<BufferNotice> {
        &self.inner.item_not_accepted
    }

    /// Store `item`; false if the buffer is full
    pub fn put(&self, sched: &mut EventScheduler, item: T) -> bool {
        self.try_put(sched, item, PutOptions::default()).is_ok()
    }

    /// Store `item` with caller overrides; false if the buffer is full or a
    /// caller-supplied id or key is already present
    pub fn put_with(&self, sched: &mut EventScheduler, item: T, options: PutOptions) -> bool {
        self.try_put(sched, item, options).is_ok()
    }

    /// Store `item`, returning its id, or hand it back if the buffer is full
    /// or the requested id/key is taken.
    pub fn try_put(&self, sched: &mut EventScheduler, item: T, options: PutOptions) -> Result<ItemId, T> {
        let priority = match options.priority {
            Some(priority) => priority,
            None => sched.next_priority(PriorityCategory::Default),
        };

        let outcome = {
            let mut state = self.inner.state.borrow_mut();
            if state.store.len() >= state.capacity {
                warn!(
                    "[{}] rejected item - buffer full ({}/{})",
                    self.inner.id,
                    state.store.len(),
                    state.capacity
                );
                Err(item)
            } else {
                let id = options.id.unwrap_or(state.next_id);
                let key = options
                    .key
                    .unwrap_or_else(|| default_key(state.key_namespace, id));
                let stored = StoredItem {
                    item,
                    id,
                    key,
                    priority,
                };
                match state.store.insert(stored) {
                    Ok(_) => {
                        state.next_id = state.next_id.max(id.saturating_add(1));
                        Ok((id, state.store.len(), state.capacity))
                    }
                    Err(stored) => {
                        warn!(
                            "[{}] rejected item - id {} or key '{}' already present",
                            self.inner.id, stored.id, stored.key
                        );
                        Err(stored.item)
                    }
                }
            }
        };

        match outcome {
            Ok((id, count, capacity)) => {
                info!("[{}] added item {} (count: {}/{})", self.inner.id, id, count, capacity);
                self.notify(sched, &self.inner.item_received, Some(id), count);
                if count >= capacity {
                    debug!("[{}] buffer is now full", self.inner.id);
                    self.notify(sched, &self.inner.buffer_full, Some(id), count);
                }
                Ok(id)
            }
            Err(item) => {
                let count = self.len();
                self.notify(sched, &self.inner.item_not_accepted, None, count);
                Err(item)
            }
        }
    }

    /// Remove the item chosen by the selection policy
    pub fn get(&self, sched: &mut EventScheduler) -> Option<T> {
        self.take(sched, "policy selection", |state| {
            let policy = state.policy;
            select(&state.store, policy, &mut state.rng)
        })
    }

    pub fn get_by_id(&self, sched: &mut EventScheduler, id: ItemId) -> Option<T> {
        self.take(sched, &format!("id {}", id), |state| state.store.slot_by_id(id))
    }

    pub fn get_by_key(&self, sched: &mut EventScheduler, key: &str) -> Option<T> {
        self.take(sched, &format!("key '{}'", key), |state| state.store.slot_by_key(key))
    }

    /// Id of the item the next `get` would return
    pub fn preview_id(&self) -> Option<ItemId> {
        let state = self.inner.state.borrow();
        // a copy of the stream, so the following get draws the same index
        let mut rng = state.rng.clone();
        let slot = select(&state.store, state.policy, &mut rng)?;
        state.store.get(slot).map(|s| s.id)
    }

    /// Inspect the item the next `get` would return without removing it
    pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let state = self.inner.state.borrow();
        let mut rng = state.rng.clone();
        let slot = select(&state.store, state.policy, &mut rng)?;
        state.store.get(slot).map(|s| f(&s.item))
    }

    pub fn preview(&self) -> Option<T>
    where
        T: Clone,
    {
        let item = self.peek_with(T::clone);
        if item.is_none() {
            warn!("[{}] preview on empty buffer", self.inner.id);
        }
        item
    }

    pub fn preview_by_id(&self, id: ItemId) -> Option<T>
    where
        T: Clone,
    {
        let state = self.inner.state.borrow();
        let item = state
            .store
            .slot_by_id(id)
            .and_then(|slot| state.store.get(slot))
            .map(|s| s.item.clone());
        if item.is_none() {
            warn!("[{}] preview of unknown id {}", self.inner.id, id);
        }
        item
    }

    pub fn preview_by_key(&self, key: &str) -> Option<T>
    where
        T: Clone,
    {
        let state = self.inner.state.borrow();
        let item = state
            .store
            .slot_by_key(key)
            .and_then(|slot| state.store.get(slot))
            .map(|s| s.item.clone());
        if item.is_none() {
            warn!("[{}] preview of unknown key '{}'", self.inner.id, key);
        }
        item
    }

    fn take<F>(&self, sched: &mut EventScheduler, what: &str, lookup: F) -> Option<T>
    where
        F: FnOnce(&mut BufferState<T>) -> Option<Slot>,
    {
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            if state.store.is_empty() {
                None
            } else {
                lookup(&mut *state)
                    .and_then(|slot| state.store.remove(slot))
                    .map(|stored| (stored, state.store.len(), state.capacity))
            }
        };

        match removed {
            Some((stored, count, capacity)) => {
                info!(
                    "[{}] removed item {} by {} (remaining: {}/{})",
                    self.inner.id, stored.id, what, count, capacity
                );
                if count == 0 {
                    self.notify(sched, &self.inner.buffer_empty, Some(stored.id), 0);
                }
                Some(stored.item)
            }
            None => {
                if self.is_empty() {
                    warn!("[{}] get by {} on empty buffer", self.inner.id, what);
                } else {
                    warn!("[{}] get by {}: no such item", self.inner.id, what);
                }
                None
            }
        }
    }

    fn notify(&self, sched: &mut EventScheduler, signal: &Signal<BufferNotice>, item_id: Option<ItemId>, count: usize) {
        let notice = BufferNotice {
            buffer: self.inner.id.clone(),
            item_id,
            count,
            time: sched.now(),
        };
        if let Err(e) = signal.raise(sched, &self.inner.id, notice) {
            error!("[{}] failed to raise {}: {}", self.inner.id, signal.name(), e);
        }
    }

    fn downgrade(&self) -> Weak<BufferInner<T>> {
        Rc::downgrade(&self.inner)
    }

    fn from_weak(weak: &Weak<BufferInner<T>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

fn default_key(namespace: u64, id: ItemId) -> String {
    Uuid::from_u128(((namespace as u128) << 64) | id as u128).to_string()
}

impl<T: 'static> Identifiable for Buffer<T> {
    fn entity_id(&self) -> &EntityId {
        &self.inner.id
    }
}

impl<T: 'static> Resettable for Buffer<T> {
    /// Drop every item and restore the initial capacity, policy and id counter
    fn reset(&self, _sched: &mut EventScheduler) -> SimResult<()> {
        let mut state = self.inner.state.borrow_mut();
        state.store.clear();
        state.capacity = state.initial.capacity;
        state.policy = state.initial.policy;
        state.next_id = 0;
        info!("[{}] reset", self.inner.id);
        Ok(())
    }
}

impl<T: 'static> ItemSink<T> for Buffer<T> {
    fn inlet(&self) -> Inlet<T> {
        let weak = self.downgrade();
        Inlet::new(self.inner.id.clone(), move |sched, item| {
            let buffer = match Buffer::from_weak(&weak) {
                Some(buffer) => buffer,
                None => return Ok(Offer::Rejected(item)),
            };
            Ok(match buffer.try_put(sched, item, PutOptions::default()) {
                Ok(_) => Offer::Accepted,
                Err(item) => Offer::Rejected(item),
            })
        })
    }
}

impl<T> std::fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Buffer")
            .field("id", &self.inner.id)
            .field("count", &state.store.len())
            .field("capacity", &state.capacity)
            .field("policy", &state.policy)
            .finish()
    }
}
