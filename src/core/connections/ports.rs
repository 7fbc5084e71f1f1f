use crate::core::errors::SimResult;
use crate::core::event_scheduler::EventScheduler;
use crate::core::priority::{Priority, PriorityCategory, PriorityCounter};
use crate::core::types::EntityId;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

/// Outcome of offering an item to a receiver
#[derive(Debug, PartialEq, Eq)]
pub enum Offer<T> {
    Accepted,
    /// Ownership goes back to the caller
    Rejected(T),
}

impl<T> Offer<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Offer::Accepted)
    }
}

type Receive<T> = Rc<dyn Fn(&mut EventScheduler, T) -> SimResult<Offer<T>>>;

/// Receiving end of an item connection
pub struct Inlet<T> {
    owner: EntityId,
    receive: Receive<T>,
}

impl<T> Clone for Inlet<T> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            receive: self.receive.clone(),
        }
    }
}

impl<T> Inlet<T> {
    pub fn new<F>(owner: EntityId, receive: F) -> Self
    where
        F: Fn(&mut EventScheduler, T) -> SimResult<Offer<T>> + 'static,
    {
        Self {
            owner,
            receive: Rc::new(receive),
        }
    }

    pub fn owner(&self) -> &EntityId {
        &self.owner
    }

    pub fn offer(&self, sched: &mut EventScheduler, item: T) -> SimResult<Offer<T>> {
        (self.receive)(sched, item)
    }
}

/// Sending end of an item connection.
///
/// Items are offered to connected inlets in priority order; the first inlet
/// that accepts takes ownership.
pub struct Outlet<T> {
    owner: EntityId,
    receivers: RefCell<Vec<(Priority, Inlet<T>)>>,
    order: RefCell<PriorityCounter>,
}

impl<T> Outlet<T> {
    pub fn new(owner: EntityId) -> Self {
        Self {
            owner,
            receivers: RefCell::new(Vec::new()),
            order: RefCell::new(PriorityCounter::default()),
        }
    }

    pub fn connect(&self, category: PriorityCategory, inlet: Inlet<T>) -> Priority {
        let priority = self.order.borrow_mut().next(category);
        debug!("[{}] connected to {} ({})", self.owner, inlet.owner(), priority);
        let mut receivers = self.receivers.borrow_mut();
        let position = receivers.partition_point(|(p, _)| *p <= priority);
        receivers.insert(position, (priority, inlet));
        priority
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers.borrow().len()
    }

    pub fn is_connected(&self) -> bool {
        self.receiver_count() > 0
    }

    pub fn emit(&self, sched: &mut EventScheduler, item: T) -> SimResult<Offer<T>> {
        let receivers: Vec<Inlet<T>> = self
            .receivers
            .borrow()
            .iter()
            .map(|(_, inlet)| inlet.clone())
            .collect();

        let mut item = item;
        for inlet in receivers {
            match inlet.offer(sched, item)? {
                Offer::Accepted => return Ok(Offer::Accepted),
                Offer::Rejected(back) => item = back,
            }
        }
        Ok(Offer::Rejected(item))
    }
}

/// Entities that emit items
pub trait ItemSource<T: 'static> {
    fn outlet(&self) -> &Outlet<T>;

    /// Push this source's items into `sink`
    fn send_to<K: ItemSink<T>>(&self, sink: &K)
    where
        Self: Sized,
    {
        self.outlet().connect(PriorityCategory::Default, sink.inlet());
    }

    fn send_to_with_priority<K: ItemSink<T>>(&self, sink: &K, category: PriorityCategory)
    where
        Self: Sized,
    {
        self.outlet().connect(category, sink.inlet());
    }
}

/// Entities that accept items
pub trait ItemSink<T: 'static> {
    fn inlet(&self) -> Inlet<T>;

    /// Accept the items `source` emits
    fn connect_to<S: ItemSource<T>>(&self, source: &S)
    where
        Self: Sized,
    {
        source.outlet().connect(PriorityCategory::Default, self.inlet());
    }

    fn connect_to_with_priority<S: ItemSource<T>>(&self, source: &S, category: PriorityCategory)
    where
        Self: Sized,
    {
        source.outlet().connect(category, self.inlet());
    }
}
