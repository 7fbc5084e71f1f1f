use crate::core::component::{Identifiable, Resettable};
use crate::core::connections::{Inlet, ItemSink, ItemSource, Offer, Outlet};
use crate::core::errors::{SimError, SimResult};
use crate::core::event::{EventHandle, SimEvent};
use crate::core::event_scheduler::EventScheduler;
use crate::core::random::{Distribution, RandomSource};
use crate::core::types::{EntityId, EntityKind};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// Counters of a delay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelayStats {
    pub received: u64,
    pub delivered: u64,
    pub rejected: u64,
    pub dropped: u64,
}

struct DelayState {
    delay: Distribution,
    capacity: Option<usize>,
    rng: RandomSource,
    in_flight: BTreeMap<u64, EventHandle>,
    next_token: u64,
    stats: DelayStats,
}

struct DelayInner<T> {
    id: EntityId,
    state: RefCell<DelayState>,
    outlet: Outlet<T>,
}

/// Holds every item for a sampled delay, then offers it downstream.
pub struct Delay<T> {
    inner: Rc<DelayInner<T>>,
}

impl<T> Clone for Delay<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Delay<T> {
    pub fn new(sched: &mut EventScheduler, name: impl Into<String>, delay: Distribution) -> SimResult<Self> {
        delay.validate()?;
        let id = EntityId::new(name, EntityKind::Delay);
        let rng = sched.random_stream(None);
        info!("[{}] created (delay {:?})", id, delay);
        Ok(Self {
            inner: Rc::new(DelayInner {
                outlet: Outlet::new(id.clone()),
                id,
                state: RefCell::new(DelayState {
                    delay,
                    capacity: None,
                    rng,
                    in_flight: BTreeMap::new(),
                    next_token: 0,
                    stats: DelayStats::default(),
                }),
            }),
        })
    }

    /// Limit the number of items held at once
    pub fn with_capacity(self, capacity: usize) -> SimResult<Self> {
        if capacity == 0 {
            return Err(SimError::InvalidConfiguration(format!(
                "[{}] capacity must be at least 1",
                self.inner.id
            )));
        }
        self.inner.state.borrow_mut().capacity = Some(capacity);
        Ok(self)
    }

    pub fn id(&self) -> &EntityId {
        &self.inner.id
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state.borrow().in_flight.len()
    }

    pub fn stats(&self) -> DelayStats {
        self.inner.state.borrow().stats.clone()
    }

    /// Accept `item` and schedule its release; hands it back when full
    pub fn put(&self, sched: &mut EventScheduler, item: T) -> SimResult<Offer<T>> {
        let (token, delay) = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            if state.capacity.is_some_and(|cap| state.in_flight.len() >= cap) {
                state.stats.rejected += 1;
                debug!("[{}] rejected item - full", self.inner.id);
                return Ok(Offer::Rejected(item));
            }
            let mut delay = state.rng.sample(&state.delay)?;
            if !delay.is_finite() {
                return Err(SimError::InvalidDuration {
                    entity: self.inner.id.clone(),
                    value: delay,
                });
            }
            if delay < 0.0 {
                warn!("[{}] negative delay {} clamped to 0", self.inner.id, delay);
                delay = 0.0;
            }
            state.next_token += 1;
            state.stats.received += 1;
            (state.next_token, delay)
        };

        let weak = Rc::downgrade(&self.inner);
        let event = SimEvent::new(self.inner.id.clone(), "release", move |s: &mut EventScheduler| {
            match Delay::from_weak(&weak) {
                Some(delay) => delay.release(s, token, item),
                None => Ok(()),
            }
        });
        let handle = sched.add_event(delay, event)?;
        self.inner.state.borrow_mut().in_flight.insert(token, handle);
        debug!("[{}] holding item for {:.3}", self.inner.id, delay);
        Ok(Offer::Accepted)
    }

    fn release(&self, sched: &mut EventScheduler, token: u64, item: T) -> SimResult<()> {
        if self.inner.state.borrow_mut().in_flight.remove(&token).is_none() {
            return Ok(());
        }
        match self.inner.outlet.emit(sched, item)? {
            Offer::Accepted => self.inner.state.borrow_mut().stats.delivered += 1,
            Offer::Rejected(_) => {
                warn!("[{}] no downstream receiver accepted the item - dropped", self.inner.id);
                self.inner.state.borrow_mut().stats.dropped += 1;
            }
        }
        Ok(())
    }

    fn from_weak(weak: &Weak<DelayInner<T>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl<T: 'static> Identifiable for Delay<T> {
    fn entity_id(&self) -> &EntityId {
        &self.inner.id
    }
}

impl<T: 'static> Resettable for Delay<T> {
    /// Cancel every held item
    fn reset(&self, sched: &mut EventScheduler) -> SimResult<()> {
        let held = std::mem::take(&mut self.inner.state.borrow_mut().in_flight);
        for handle in held.into_values() {
            if let Err(e) = sched.remove_event(handle) {
                debug!("[{}] release left to expire: {}", self.inner.id, e);
            }
        }
        self.inner.state.borrow_mut().stats = DelayStats::default();
        info!("[{}] reset", self.inner.id);
        Ok(())
    }
}

impl<T: 'static> ItemSink<T> for Delay<T> {
    fn inlet(&self) -> Inlet<T> {
        let weak = Rc::downgrade(&self.inner);
        Inlet::new(self.inner.id.clone(), move |sched, item| match Delay::from_weak(&weak) {
            Some(delay) => delay.put(sched, item),
            None => Ok(Offer::Rejected(item)),
        })
    }
}

impl<T: 'static> ItemSource<T> for Delay<T> {
    fn outlet(&self) -> &Outlet<T> {
        &self.inner.outlet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::sink::Sink;

    #[test]
    fn test_items_arrive_after_delay() {
        let mut sched = EventScheduler::with_seed(3);
        let conveyor = Delay::new(&mut sched, "conveyor", Distribution::constant(2.5)).unwrap();
        let sink = Sink::new("dock").retaining();
        conveyor.send_to(&sink);

        conveyor.put(&mut sched, "crate").unwrap();
        assert_eq!(conveyor.in_flight(), 1);
        sched.run().unwrap();

        assert_eq!(sched.now().as_f64(), 2.5);
        assert_eq!(sink.take_items(), vec!["crate"]);
        assert_eq!(conveyor.stats().delivered, 1);
    }

    #[test]
    fn test_capacity_limits_items_held() {
        let mut sched = EventScheduler::with_seed(3);
        let conveyor = Delay::new(&mut sched, "conveyor", Distribution::constant(1.0))
            .unwrap()
            .with_capacity(1)
            .unwrap();
        assert!(conveyor.put(&mut sched, 1).unwrap().is_accepted());
        assert!(!conveyor.put(&mut sched, 2).unwrap().is_accepted());
        assert_eq!(conveyor.stats().rejected, 1);
    }

    #[test]
    fn test_unconnected_items_are_dropped() {
        let mut sched = EventScheduler::with_seed(3);
        let conveyor = Delay::new(&mut sched, "conveyor", Distribution::constant(1.0)).unwrap();
        conveyor.put(&mut sched, 1).unwrap();
        sched.run().unwrap();
        assert_eq!(conveyor.stats().dropped, 1);
        assert_eq!(conveyor.in_flight(), 0);
    }

    #[test]
    fn test_reset_cancels_held_items() {
        let mut sched = EventScheduler::with_seed(3);
        let conveyor = Delay::new(&mut sched, "conveyor", Distribution::constant(1.0)).unwrap();
        conveyor.put(&mut sched, 1).unwrap();
        conveyor.reset(&mut sched).unwrap();
        assert!(!sched.has_pending_events());
        assert_eq!(conveyor.in_flight(), 0);
    }
}
