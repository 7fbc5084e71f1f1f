use crate::core::component::{Identifiable, Resettable};
use crate::core::connections::{Inlet, ItemSink, Offer};
use crate::core::errors::SimResult;
use crate::core::event_scheduler::EventScheduler;
use crate::core::types::{EntityId, EntityKind, SimTime};
use log::{debug, info};
use std::cell::RefCell;
use std::rc::Rc;

struct SinkState<T> {
    received: u64,
    last_arrival: Option<SimTime>,
    retain: bool,
    items: Vec<T>,
}

struct SinkInner<T> {
    id: EntityId,
    state: RefCell<SinkState<T>>,
}

/// Terminal collector: accepts everything and counts it
pub struct Sink<T> {
    inner: Rc<SinkInner<T>>,
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Sink<T> {
    pub fn new(name: impl Into<String>) -> Self {
        let id = EntityId::new(name, EntityKind::Sink);
        debug!("[{}] created", id);
        Self {
            inner: Rc::new(SinkInner {
                id,
                state: RefCell::new(SinkState {
                    received: 0,
                    last_arrival: None,
                    retain: false,
                    items: Vec::new(),
                }),
            }),
        }
    }

    /// Keep received items until `take_items`
    pub fn retaining(self) -> Self {
        self.inner.state.borrow_mut().retain = true;
        self
    }

    pub fn id(&self) -> &EntityId {
        &self.inner.id
    }

    pub fn received(&self) -> u64 {
        self.inner.state.borrow().received
    }

    pub fn last_arrival(&self) -> Option<SimTime> {
        self.inner.state.borrow().last_arrival
    }

    pub fn take_items(&self) -> Vec<T> {
        std::mem::take(&mut self.inner.state.borrow_mut().items)
    }

    pub fn put(&self, sched: &EventScheduler, item: T) {
        let mut state = self.inner.state.borrow_mut();
        state.received += 1;
        state.last_arrival = Some(sched.now());
        if state.retain {
            state.items.push(item);
        }
        debug!("[{}] received item #{}", self.inner.id, state.received);
    }
}

impl<T: 'static> Identifiable for Sink<T> {
    fn entity_id(&self) -> &EntityId {
        &self.inner.id
    }
}

impl<T: 'static> Resettable for Sink<T> {
    fn reset(&self, _sched: &mut EventScheduler) -> SimResult<()> {
        let mut state = self.inner.state.borrow_mut();
        state.received = 0;
        state.last_arrival = None;
        state.items.clear();
        info!("[{}] reset", self.inner.id);
        Ok(())
    }
}

impl<T: 'static> ItemSink<T> for Sink<T> {
    fn inlet(&self) -> Inlet<T> {
        let sink = Rc::downgrade(&self.inner);
        Inlet::new(self.inner.id.clone(), move |sched, item| match sink.upgrade() {
            Some(inner) => {
                Sink { inner }.put(sched, item);
                Ok(Offer::Accepted)
            }
            None => Ok(Offer::Rejected(item)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_without_retaining() {
        let sched = EventScheduler::with_seed(0);
        let sink = Sink::new("exit");
        sink.put(&sched, 1);
        sink.put(&sched, 2);
        assert_eq!(sink.received(), 2);
        assert!(sink.take_items().is_empty());
        assert_eq!(sink.last_arrival(), Some(SimTime::ZERO));
    }

    #[test]
    fn test_retaining_and_reset() {
        let mut sched = EventScheduler::with_seed(0);
        let sink = Sink::new("exit").retaining();
        let inlet = sink.inlet();
        assert!(inlet.offer(&mut sched, 'a').unwrap().is_accepted());
        assert_eq!(sink.take_items(), vec!['a']);
        assert!(sink.take_items().is_empty());

        sink.reset(&mut sched).unwrap();
        assert_eq!(sink.received(), 0);
    }
}
