use super::errors::SimResult;
use super::event::SimEvent;
use super::event_scheduler::EventScheduler;
use super::priority::Priority;
use super::types::EntityId;
use std::cell::RefCell;
use std::rc::Rc;

type Handler<A> = Rc<dyn Fn(&mut EventScheduler, &A) -> SimResult<()>>;

/// Subscriber list keyed by Priority.
///
/// Raising a signal does not call subscribers directly: it schedules one
/// zero-delay event per subscriber, in subscriber priority order, so the
/// scheduler decides when they run and every delivery shows up in the trace.
pub struct Signal<A> {
    name: &'static str,
    subscribers: RefCell<Vec<(Priority, Handler<A>)>>,
}

impl<A: Clone + 'static> Signal<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe<F>(&self, priority: Priority, handler: F)
    where
        F: Fn(&mut EventScheduler, &A) -> SimResult<()> + 'static,
    {
        let mut subscribers = self.subscribers.borrow_mut();
        let position = subscribers.partition_point(|(p, _)| *p <= priority);
        subscribers.insert(position, (priority, Rc::new(handler)));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn clear(&self) {
        self.subscribers.borrow_mut().clear();
    }

    /// Schedule delivery of `payload` to every subscriber at the current time
    pub fn raise(&self, sched: &mut EventScheduler, source: &EntityId, payload: A) -> SimResult<()> {
        let subscribers: Vec<(Priority, Handler<A>)> = self.subscribers.borrow().clone();
        for (priority, handler) in subscribers {
            let payload = payload.clone();
            let event = SimEvent::new(source.clone(), self.name, move |s: &mut EventScheduler| {
                handler(s, &payload)
            })
            .with_category(priority.category);
            sched.add_event(0.0, event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::priority::PriorityCategory;
    use crate::core::types::EntityKind;

    #[test]
    fn test_raise_delivers_in_priority_order() {
        let mut sched = EventScheduler::with_seed(1);
        let signal: Signal<u32> = Signal::new("tick");
        let seen = Rc::new(RefCell::new(Vec::new()));

        let low = sched.next_priority(PriorityCategory::LowLevelAfterOthers);
        let high = sched.next_priority(PriorityCategory::SimWorldBeforeOthers);
        let s1 = seen.clone();
        signal.subscribe(low, move |_, v| {
            s1.borrow_mut().push(("low", *v));
            Ok(())
        });
        let s2 = seen.clone();
        signal.subscribe(high, move |_, v| {
            s2.borrow_mut().push(("high", *v));
            Ok(())
        });

        let source = EntityId::new("src", EntityKind::Model);
        signal.raise(&mut sched, &source, 7).unwrap();
        assert!(seen.borrow().is_empty());
        sched.run().unwrap();
        assert_eq!(*seen.borrow(), vec![("high", 7), ("low", 7)]);
        assert_eq!(sched.trace()[0].label, "tick");
    }

    #[test]
    fn test_raise_without_subscribers_is_silent() {
        let mut sched = EventScheduler::with_seed(1);
        let signal: Signal<()> = Signal::new("nobody");
        signal.raise(&mut sched, &EntityId::model(), ()).unwrap();
        assert_eq!(sched.pending_events(), 0);
    }
}
