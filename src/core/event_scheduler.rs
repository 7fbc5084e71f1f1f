use super::errors::{SimError, SimResult};
use super::event::{Action, EventHandle, SimEvent, TraceRecord};
use super::execution::config::SimulationConfig;
use super::priority::{Priority, PriorityCategory, PriorityCounter};
use super::random::RandomSource;
use super::types::{EntityId, SimTime};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Observer trait for simulation progress
pub trait SimulationObserver {
    /// Called when virtual time advances
    fn on_time_advance(&mut self, old_time: SimTime, new_time: SimTime);

    /// Called after an event has been processed
    fn on_event_processed(&mut self, record: &TraceRecord);
}

#[derive(Debug)]
struct ScheduledEvent {
    time: SimTime,
    priority: Priority,
    handle: EventHandle,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.priority == other.priority
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap by default)
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.priority.cmp(&self.priority))
    }
}

struct PendingEvent {
    time: SimTime,
    priority: Priority,
    source: EntityId,
    label: String,
    action: Action,
}

/// Virtual-time event scheduler.
///
/// Events are ordered by `(time, Priority)`; since every priority carries a
/// unique insertion order, two runs with the same seed and the same calls
/// fire events in the same order. Cancelled events are dropped from the
/// pending table and their heap entries skipped lazily.
pub struct EventScheduler {
    config: SimulationConfig,
    now: SimTime,
    queue: BinaryHeap<ScheduledEvent>,
    pending: HashMap<EventHandle, PendingEvent>,
    priorities: PriorityCounter,
    next_handle: u64,
    seed_source: StdRng,
    trace: Vec<TraceRecord>,
    events_processed: u64,
    halted: bool,
    observers: Vec<Box<dyn SimulationObserver>>,
}

impl EventScheduler {
    /// Create a scheduler from a validated configuration
    pub fn new(config: SimulationConfig) -> SimResult<Self> {
        config.validate()?;
        info!("Creating scheduler with seed {}", config.seed);
        Ok(Self::from_valid_config(config))
    }

    /// Scheduler with default configuration and the given master seed
    pub fn with_seed(seed: u64) -> Self {
        Self::from_valid_config(SimulationConfig::new().with_seed(seed))
    }

    fn from_valid_config(config: SimulationConfig) -> Self {
        Self {
            seed_source: StdRng::seed_from_u64(config.seed),
            config,
            now: SimTime::ZERO,
            queue: BinaryHeap::new(),
            pending: HashMap::new(),
            priorities: PriorityCounter::default(),
            next_handle: 0,
            trace: Vec::new(),
            events_processed: 0,
            halted: false,
            observers: Vec::new(),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Current virtual time
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Fresh priority in `category`, later than every priority handed out before
    pub fn next_priority(&mut self, category: PriorityCategory) -> Priority {
        self.priorities.next(category)
    }

    /// Register a callback to run `delay` after the current time
    pub fn schedule<F>(&mut self, delay: f64, callback: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut EventScheduler) -> SimResult<()> + 'static,
    {
        self.add_event(delay, SimEvent::new(EntityId::model(), "callback", callback))
    }

    /// Register an event to fire at `now + delay`
    pub fn add_event(&mut self, delay: f64, event: SimEvent) -> SimResult<EventHandle> {
        let time = self.now.after(delay).ok_or(SimError::InvalidDelay(delay))?;
        let priority = self.priorities.next(event.category);
        let handle = EventHandle(self.next_handle);
        self.next_handle += 1;

        debug!(
            "[{}] scheduled '{}' at {} ({})",
            event.source, event.label, time, priority
        );

        self.queue.push(ScheduledEvent {
            time,
            priority,
            handle,
        });
        self.pending.insert(
            handle,
            PendingEvent {
                time,
                priority,
                source: event.source,
                label: event.label,
                action: event.action,
            },
        );
        Ok(handle)
    }

    /// Cancel a future event.
    ///
    /// Events at or before the current time, and events that already fired
    /// or were cancelled, cannot be removed.
    pub fn remove_event(&mut self, handle: EventHandle) -> SimResult<()> {
        let scheduled = self
            .pending
            .get(&handle)
            .map(|event| event.time)
            .ok_or(SimError::UnknownEvent(handle))?;

        if scheduled <= self.now {
            return Err(SimError::EventNotInFuture {
                handle,
                scheduled,
                now: self.now,
            });
        }

        if let Some(event) = self.pending.remove(&handle) {
            debug!("[{}] cancelled '{}' at {}", event.source, event.label, event.time);
        }
        Ok(())
    }

    /// Scheduled time of a pending event
    pub fn event_time(&self, handle: EventHandle) -> Option<SimTime> {
        self.pending.get(&handle).map(|event| event.time)
    }

    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    /// Number of events still waiting to fire
    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending_events(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Next seed from the master seed stream
    pub fn derive_seed(&mut self) -> u64 {
        self.seed_source.gen()
    }

    /// Per-entity random stream; without an explicit seed one is derived
    /// from the master seed in creation order.
    pub fn random_stream(&mut self, seed: Option<u64>) -> RandomSource {
        let seed = seed.unwrap_or_else(|| self.derive_seed());
        RandomSource::from_seed(seed)
    }

    /// Add an observer to the simulation
    pub fn add_observer(&mut self, observer: Box<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    /// Fired events, in order, when trace recording is enabled
    pub fn trace(&self) -> &[TraceRecord] {
        &self.trace
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Stop `run` after the event currently being processed
    pub fn halt(&mut self) {
        self.halted = true;
    }

    fn peek_live(&mut self) -> Option<SimTime> {
        while let Some(next) = self.queue.peek() {
            if self.pending.contains_key(&next.handle) {
                return Some(next.time);
            }
            self.queue.pop();
        }
        None
    }

    /// Process the next event, returns true if events remain.
    ///
    /// Events past the configured `max_time` are left in the queue.
    pub fn step(&mut self) -> SimResult<bool> {
        let next_time = match self.peek_live() {
            Some(time) => time,
            None => return Ok(false),
        };
        if let Some(max_time) = self.config.max_time {
            if next_time.as_f64() > max_time {
                return Ok(false);
            }
        }

        let scheduled = match self.queue.pop() {
            Some(scheduled) => scheduled,
            None => return Ok(false),
        };
        let event = match self.pending.remove(&scheduled.handle) {
            Some(event) => event,
            None => return Ok(self.has_pending_events()),
        };

        let old_time = self.now;
        self.now = event.time;
        if old_time != self.now {
            debug!("=== Simulation {} ===", self.now);
            for observer in &mut self.observers {
                observer.on_time_advance(old_time, event.time);
            }
        }

        let record = TraceRecord {
            time: event.time,
            priority: event.priority,
            source: event.source,
            label: event.label,
        };
        debug!("processing {}", record);

        (event.action)(self)?;
        self.events_processed += 1;

        for observer in &mut self.observers {
            observer.on_event_processed(&record);
        }
        if self.config.record_trace {
            self.trace.push(record);
        }

        Ok(self.has_pending_events())
    }

    /// Run until the queue drains, a limit is hit or `halt` is called;
    /// returns the final time.
    pub fn run(&mut self) -> SimResult<SimTime> {
        self.halted = false;
        while !self.halted {
            if let Some(max_events) = self.config.max_events {
                if self.events_processed >= max_events {
                    break;
                }
            }
            if !self.step()? {
                break;
            }
        }
        info!(
            "Simulation stopped at {} after {} events",
            self.now, self.events_processed
        );
        Ok(self.now)
    }

    /// Process every event scheduled at or before `until`, then move the
    /// clock to `until`. The horizon is capped at the configured `max_time`.
    pub fn run_until(&mut self, until: f64) -> SimResult<SimTime> {
        let mut horizon = SimTime::new(until).ok_or(SimError::InvalidDelay(until))?;
        if let Some(max_time) = self.config.max_time.and_then(SimTime::new) {
            horizon = horizon.min(max_time);
        }
        self.halted = false;
        while !self.halted {
            match self.peek_live() {
                Some(time) if time <= horizon => {
                    if !self.step()? {
                        break;
                    }
                }
                _ => break,
            }
        }
        if horizon > self.now {
            for observer in &mut self.observers {
                observer.on_time_advance(self.now, horizon);
            }
            self.now = horizon;
        }
        Ok(self.now)
    }
}

impl std::fmt::Debug for EventScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventScheduler")
            .field("now", &self.now)
            .field("pending", &self.pending.len())
            .field("events_processed", &self.events_processed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EntityKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn FnOnce(&mut EventScheduler) -> SimResult<()>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &str| {
            let sink = sink.clone();
            let name = name.to_string();
            Box::new(move |_: &mut EventScheduler| {
                sink.borrow_mut().push(name);
                Ok(())
            }) as Box<dyn FnOnce(&mut EventScheduler) -> SimResult<()>>
        };
        (log, make)
    }

    #[test]
    fn test_time_ordering() {
        let mut sched = EventScheduler::with_seed(1);
        let (log, make) = recorder();
        sched.schedule(3.0, make("late")).unwrap();
        sched.schedule(1.0, make("early")).unwrap();
        sched.schedule(2.0, make("mid")).unwrap();
        let end = sched.run().unwrap();
        assert_eq!(*log.borrow(), vec!["early", "mid", "late"]);
        assert_eq!(end.as_f64(), 3.0);
    }

    #[test]
    fn test_same_time_category_then_insertion() {
        let mut sched = EventScheduler::with_seed(1);
        let (log, make) = recorder();
        let src = EntityId::new("t", EntityKind::Model);
        sched.add_event(1.0, SimEvent::new(src.clone(), "a", make("a"))).unwrap();
        sched
            .add_event(
                1.0,
                SimEvent::new(src.clone(), "b", make("b")).with_category(PriorityCategory::SimWorldBeforeOthers),
            )
            .unwrap();
        sched.add_event(1.0, SimEvent::new(src.clone(), "c", make("c"))).unwrap();
        sched
            .add_event(
                1.0,
                SimEvent::new(src, "d", make("d")).with_category(PriorityCategory::LowLevelAfterOthers),
            )
            .unwrap();
        sched.run().unwrap();
        assert_eq!(*log.borrow(), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_remove_future_event() {
        let mut sched = EventScheduler::with_seed(1);
        let (log, make) = recorder();
        let handle = sched.schedule(5.0, make("cancelled")).unwrap();
        sched.schedule(6.0, make("kept")).unwrap();
        sched.remove_event(handle).unwrap();
        assert_eq!(sched.pending_events(), 1);
        sched.run().unwrap();
        assert_eq!(*log.borrow(), vec!["kept"]);
    }

    #[test]
    fn test_remove_present_event_is_error() {
        let mut sched = EventScheduler::with_seed(1);
        let handle = sched.schedule(0.0, |_| Ok(())).unwrap();
        let err = sched.remove_event(handle).unwrap_err();
        assert!(matches!(err, SimError::EventNotInFuture { .. }));
    }

    #[test]
    fn test_remove_fired_event_is_error() {
        let mut sched = EventScheduler::with_seed(1);
        let handle = sched.schedule(1.0, |_| Ok(())).unwrap();
        sched.run().unwrap();
        assert_eq!(sched.remove_event(handle), Err(SimError::UnknownEvent(handle)));
    }

    #[test]
    fn test_negative_delay_rejected() {
        let mut sched = EventScheduler::with_seed(1);
        assert_eq!(
            sched.schedule(-1.0, |_| Ok(())).unwrap_err(),
            SimError::InvalidDelay(-1.0)
        );
    }

    #[test]
    fn test_action_can_schedule_more() {
        let mut sched = EventScheduler::with_seed(1);
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        sched
            .schedule(1.0, move |s| {
                *c.borrow_mut() += 1;
                let c2 = c.clone();
                s.schedule(2.0, move |_| {
                    *c2.borrow_mut() += 1;
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();
        assert_eq!(sched.run().unwrap().as_f64(), 3.0);
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn test_action_error_terminates_run() {
        let mut sched = EventScheduler::with_seed(1);
        sched
            .schedule(1.0, |_| Err(SimError::InvalidConfiguration("boom".into())))
            .unwrap();
        assert!(sched.run().is_err());
    }

    #[test]
    fn test_max_time_leaves_later_events() {
        let config = SimulationConfig::new().with_seed(3).with_max_time(5.0);
        let mut sched = EventScheduler::new(config).unwrap();
        sched.schedule(4.0, |_| Ok(())).unwrap();
        sched.schedule(6.0, |_| Ok(())).unwrap();
        sched.run().unwrap();
        assert_eq!(sched.now().as_f64(), 4.0);
        assert_eq!(sched.pending_events(), 1);
    }

    #[test]
    fn test_run_until_advances_clock() {
        let mut sched = EventScheduler::with_seed(1);
        sched.schedule(2.0, |_| Ok(())).unwrap();
        sched.schedule(8.0, |_| Ok(())).unwrap();
        assert_eq!(sched.run_until(5.0).unwrap().as_f64(), 5.0);
        assert_eq!(sched.pending_events(), 1);
    }

    #[test]
    fn test_run_until_stops_at_max_time() {
        let config = SimulationConfig::new().with_seed(3).with_max_time(5.0);
        let mut sched = EventScheduler::new(config).unwrap();
        sched.schedule(6.0, |_| Ok(())).unwrap();
        assert_eq!(sched.run_until(10.0).unwrap().as_f64(), 5.0);
        assert_eq!(sched.pending_events(), 1);
    }

    #[test]
    fn test_max_events_limits_run() {
        let config = SimulationConfig::new().with_seed(3).with_max_events(2);
        let mut sched = EventScheduler::new(config).unwrap();
        for delay in [1.0, 2.0, 3.0] {
            sched.schedule(delay, |_| Ok(())).unwrap();
        }
        assert_eq!(sched.run().unwrap().as_f64(), 2.0);
        assert_eq!(sched.events_processed(), 2);
        assert_eq!(sched.pending_events(), 1);
    }

    #[test]
    fn test_halt_from_action_stops_run() {
        let mut sched = EventScheduler::with_seed(1);
        sched.schedule(1.0, |s| {
            s.halt();
            Ok(())
        })
        .unwrap();
        sched.schedule(2.0, |_| Ok(())).unwrap();
        assert_eq!(sched.run().unwrap().as_f64(), 1.0);
        assert_eq!(sched.pending_events(), 1);

        // a later run picks up where the halt left off
        assert_eq!(sched.run().unwrap().as_f64(), 2.0);
    }

    #[test]
    fn test_trace_recorded() {
        let mut sched = EventScheduler::with_seed(1);
        sched.schedule(1.0, |_| Ok(())).unwrap();
        sched.run().unwrap();
        assert_eq!(sched.trace().len(), 1);
        assert_eq!(sched.trace()[0].label, "callback");
    }

    #[test]
    fn test_random_streams_reproducible() {
        let mut a = EventScheduler::with_seed(99);
        let mut b = EventScheduler::with_seed(99);
        let mut ra = a.random_stream(None);
        let mut rb = b.random_stream(None);
        assert_eq!(ra.seed(), rb.seed());
        assert_eq!(ra.index(1000), rb.index(1000));
    }

    struct Counting(Rc<RefCell<(u32, u32)>>);

    impl SimulationObserver for Counting {
        fn on_time_advance(&mut self, _old: SimTime, _new: SimTime) {
            self.0.borrow_mut().0 += 1;
        }

        fn on_event_processed(&mut self, _record: &TraceRecord) {
            self.0.borrow_mut().1 += 1;
        }
    }

    #[test]
    fn test_observers_notified() {
        let mut sched = EventScheduler::with_seed(1);
        let counts = Rc::new(RefCell::new((0, 0)));
        sched.add_observer(Box::new(Counting(counts.clone())));
        sched.schedule(1.0, |_| Ok(())).unwrap();
        sched.schedule(1.0, |_| Ok(())).unwrap();
        sched.schedule(2.0, |_| Ok(())).unwrap();
        sched.run().unwrap();
        assert_eq!(*counts.borrow(), (2, 3));
    }
}
