//! Production resource: accumulates material, works on a committed batch for
//! a machining interval and emits one product per run, subject to random
//! failures and recovery.
//!
//! Failure timing races two clocks. When a run starts, the remaining
//! machining time is compared with the remaining time to failure; only the
//! earlier of the two is scheduled and the other clock is decremented by the
//! elapsed amount and carried forward. That is exact for exponential
//! time-to-failure and an approximation for every other distribution.

pub mod config;
pub mod material;
pub mod state;

pub use config::{ServerBuilder, ServerOptions};
pub use material::{BatchSize, CollectBatch, FilteredBatch, MachiningTime, MaterialPolicy, ProduceWith, ProductFactory};
pub use state::{ServerNotice, ServerPhase, ServerStats};

use crate::core::component::{Identifiable, Resettable};
use crate::core::connections::{Inlet, ItemSink, ItemSource, Offer, Outlet};
use crate::core::errors::{SimError, SimResult};
use crate::core::event::SimEvent;
use crate::core::event_scheduler::EventScheduler;
use crate::core::priority::PriorityCategory;
use crate::core::random::{Distribution, RandomSource};
use crate::core::signal::Signal;
use crate::core::types::{EntityId, EntityKind, SimTime};
use crate::entities::buffer::Buffer;
use log::{debug, error, info, warn};
use state::{InterruptedRun, Pending, PendingKind};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

struct ServerState<M, P, D> {
    options: ServerOptions,
    phase: ServerPhase,
    stopped: bool,
    current_material: Vec<M>,
    active_material: Vec<M>,
    interrupted: Option<InterruptedRun<M>>,
    pending: Option<Pending>,
    next_token: u64,
    machining: MachiningTime<M, D>,
    time_to_failure: Option<Distribution>,
    time_to_recovery: Option<Distribution>,
    /// Pre-sampled duration of the next run, for sampled machining times
    next_machining: Option<f64>,
    remaining_to_failure: Option<f64>,
    material: Box<dyn MaterialPolicy<M, D>>,
    factory: Box<dyn ProductFactory<M, P, D>>,
    data: D,
    rng: RandomSource,
    stats: ServerStats,
}

impl<M, P, D> ServerState<M, P, D> {
    fn is_complete(&self) -> bool {
        self.material.is_complete(&self.current_material, &self.data)
    }

    fn is_usable(&self, candidate: &M) -> bool {
        self.material.is_usable(&self.current_material, candidate, &self.data)
    }

    fn can_run(&self) -> bool {
        self.interrupted.is_some() || self.is_complete()
    }

    fn in_maintenance(&self) -> bool {
        matches!(self.phase, ServerPhase::Damaged | ServerPhase::Recovering)
    }

    fn accepts_material(&self) -> bool {
        !self.in_maintenance() || self.options.allow_push_during_maintenance
    }

    fn sample_failure(&mut self, entity: &EntityId) -> SimResult<()> {
        self.remaining_to_failure = match &self.time_to_failure {
            Some(dist) => Some(checked_duration(entity, self.rng.sample(dist)?)?),
            None => None,
        };
        Ok(())
    }

    fn sample_next_machining(&mut self, entity: &EntityId) -> SimResult<()> {
        self.next_machining = match &self.machining {
            MachiningTime::Distribution(dist) => Some(checked_duration(entity, self.rng.sample(dist)?)?),
            MachiningTime::Function(_) => None,
        };
        Ok(())
    }

    /// Duration of the run about to start on `active_material`
    fn take_machining_time(&mut self, entity: &EntityId) -> SimResult<f64> {
        if let Some(duration) = self.next_machining.take() {
            return Ok(duration);
        }
        let raw = match &self.machining {
            MachiningTime::Distribution(dist) => self.rng.sample(dist)?,
            MachiningTime::Function(f) => f(&self.active_material, &self.data),
        };
        checked_duration(entity, raw)
    }
}

/// NaN and infinite durations are rejected; negative ones clamp to zero.
fn checked_duration(entity: &EntityId, value: f64) -> SimResult<f64> {
    if !value.is_finite() {
        return Err(SimError::InvalidDuration {
            entity: entity.clone(),
            value,
        });
    }
    if value < 0.0 {
        warn!("[{}] negative duration {} clamped to 0", entity, value);
        return Ok(0.0);
    }
    Ok(value)
}

struct ServerInner<M, P, D> {
    id: EntityId,
    state: RefCell<ServerState<M, P, D>>,
    sources: RefCell<Vec<Buffer<M>>>,
    outlet: Outlet<P>,
    state_changed: Signal<ServerNotice>,
    product_finished: Signal<ServerNotice>,
    failed: Signal<ServerNotice>,
    recovered: Signal<ServerNotice>,
    item_not_accepted: Signal<ServerNotice>,
}

/// Shared handle to a server; clones refer to the same server.
pub struct Server<M, P, D = ()> {
    inner: Rc<ServerInner<M, P, D>>,
}

impl<M, P, D> Clone for Server<M, P, D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: 'static, P: 'static, D: 'static> Server<M, P, D> {
    pub fn builder(name: impl Into<String>, data: D) -> ServerBuilder<M, P, D> {
        ServerBuilder::new(name, data)
    }

    pub(crate) fn from_builder(sched: &mut EventScheduler, builder: ServerBuilder<M, P, D>) -> SimResult<Self> {
        let id = EntityId::new(builder.name, EntityKind::Server);
        let (machining, factory) = match (builder.machining, builder.factory) {
            (Some(machining), Some(factory)) => (machining, factory),
            _ => {
                return Err(SimError::InvalidConfiguration(format!(
                    "[{}] machining time and product factory are required",
                    id
                )))
            }
        };
        let rng = sched.random_stream(builder.options.seed);

        let mut state = ServerState {
            options: builder.options,
            phase: ServerPhase::Idle,
            stopped: false,
            current_material: Vec::new(),
            active_material: Vec::new(),
            interrupted: None,
            pending: None,
            next_token: 0,
            machining,
            time_to_failure: builder.time_to_failure,
            time_to_recovery: builder.time_to_recovery,
            next_machining: None,
            remaining_to_failure: None,
            material: builder.material,
            factory,
            data: builder.data,
            rng,
            stats: ServerStats::default(),
        };
        state.sample_next_machining(&id)?;
        state.sample_failure(&id)?;
        info!("[{}] created (machining {:?})", id, state.machining);
        if let Some(ttf) = state.time_to_failure.as_ref().filter(|d| !d.is_memoryless()) {
            warn!(
                "[{}] time to failure {:?} is not exponential, carried failure clocks are approximate",
                id, ttf
            );
        }

        Ok(Self {
            inner: Rc::new(ServerInner {
                outlet: Outlet::new(id.clone()),
                id,
                state: RefCell::new(state),
                sources: RefCell::new(Vec::new()),
                state_changed: Signal::new("state_changed"),
                product_finished: Signal::new("product_finished"),
                failed: Signal::new("failed"),
                recovered: Signal::new("recovered"),
                item_not_accepted: Signal::new("item_not_accepted"),
            }),
        })
    }

    pub fn id(&self) -> &EntityId {
        &self.inner.id
    }

    pub fn phase(&self) -> ServerPhase {
        self.inner.state.borrow().phase
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.state.borrow().stopped
    }

    pub fn is_idle(&self) -> bool {
        self.phase() == ServerPhase::Idle
    }

    pub fn is_working(&self) -> bool {
        self.phase() == ServerPhase::Working
    }

    pub fn is_material_complete(&self) -> bool {
        self.inner.state.borrow().is_complete()
    }

    pub fn current_material_len(&self) -> usize {
        self.inner.state.borrow().current_material.len()
    }

    pub fn active_material_len(&self) -> usize {
        self.inner.state.borrow().active_material.len()
    }

    pub fn has_interrupted_run(&self) -> bool {
        self.inner.state.borrow().interrupted.is_some()
    }

    /// Machining time owed by the interrupted run, if any
    pub fn interrupted_remaining(&self) -> Option<f64> {
        self.inner.state.borrow().interrupted.as_ref().map(|run| run.remaining)
    }

    /// Time-to-failure clock carried over to the next run
    pub fn remaining_time_to_failure(&self) -> Option<f64> {
        self.inner.state.borrow().remaining_to_failure
    }

    /// Scheduled time of the pending finished/failed/recovered event
    pub fn pending_event_time(&self) -> Option<SimTime> {
        self.inner.state.borrow().pending.map(|p| p.scheduled_at)
    }

    pub fn stats(&self) -> ServerStats {
        self.inner.state.borrow().stats.clone()
    }

    pub fn options(&self) -> ServerOptions {
        self.inner.state.borrow().options.clone()
    }

    pub fn with_data<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        f(&self.inner.state.borrow().data)
    }

    pub fn on_state_changed(&self) -> &Signal<ServerNotice> {
        &self.inner.state_changed
    }

    pub fn on_product_finished(&self) -> &Signal<ServerNotice> {
        &self.inner.product_finished
    }

    pub fn on_failed(&self) -> &Signal<ServerNotice> {
        &self.inner.failed
    }

    pub fn on_recovered(&self) -> &Signal<ServerNotice> {
        &self.inner.recovered
    }

    pub fn on_item_not_accepted(&self) -> &Signal<ServerNotice> {
        &self.inner.item_not_accepted
    }

    /// Push material into the server; false if it is not accepted
    pub fn put(&self, sched: &mut EventScheduler, material: M) -> SimResult<bool> {
        Ok(self.offer_material(sched, material, true)?.is_accepted())
    }

    /// Pull material from `buffer` whenever it receives an item and whenever
    /// this server finishes or recovers.
    pub fn pull_from(&self, sched: &mut EventScheduler, buffer: &Buffer<M>) -> SimResult<()> {
        self.inner.sources.borrow_mut().push(buffer.clone());

        let weak = Rc::downgrade(&self.inner);
        let priority = sched.next_priority(PriorityCategory::Default);
        buffer.on_item_received().subscribe(priority, move |s, _notice| {
            match Server::from_weak(&weak) {
                Some(server) => server.refill(s),
                None => Ok(()),
            }
        });
        info!("[{}] pulling material from {}", self.inner.id, buffer.id());

        self.refill(sched)
    }

    /// Start a run. Busy servers are an error; incomplete material is `false`.
    /// Clears the stop flag.
    pub fn start(&self, sched: &mut EventScheduler) -> SimResult<bool> {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.phase != ServerPhase::Idle {
                return Err(SimError::ServerBusy {
                    entity: self.inner.id.clone(),
                    phase: state.phase.to_string(),
                });
            }
            state.stopped = false;
            if !state.can_run() {
                debug!("[{}] start refused - material incomplete", self.inner.id);
                return Ok(false);
            }
        }
        self.begin_run(sched)?;
        Ok(true)
    }

    /// Set the stop flag on a working server. With `cancel_scheduled` the
    /// pending event is removed and the run is held as an interrupted run.
    pub fn stop(&self, sched: &mut EventScheduler, cancel_scheduled: bool) -> SimResult<bool> {
        let pending = {
            let state = self.inner.state.borrow();
            if state.phase != ServerPhase::Working {
                debug!("[{}] stop ignored - not working", self.inner.id);
                return Ok(false);
            }
            state.pending
        };

        if cancel_scheduled {
            if let Some(pending) = pending {
                sched.remove_event(pending.handle)?;
                let now = sched.now().as_f64();
                let mut guard = self.inner.state.borrow_mut();
                let state = &mut *guard;
                let elapsed = now - pending.started_at.as_f64();
                let until_event = pending.scheduled_at.as_f64() - now;
                state.remaining_to_failure = match pending.kind {
                    PendingKind::Failed => Some(until_event),
                    _ => state.remaining_to_failure.map(|ttf| ttf + until_event),
                };
                let material = std::mem::take(&mut state.active_material);
                state.interrupted = Some(InterruptedRun {
                    material,
                    remaining: (pending.machining - elapsed).max(0.0),
                });
                state.pending = None;
                state.phase = ServerPhase::Idle;
            }
        }

        self.inner.state.borrow_mut().stopped = true;
        info!(
            "[{}] stopped{}",
            self.inner.id,
            if cancel_scheduled { " (run cancelled)" } else { "" }
        );
        self.notify(sched, &self.inner.state_changed);
        Ok(true)
    }

    /// Schedule recovery after a delay drawn from the recovery distribution
    /// (immediately when none is configured).
    pub fn recover(&self, sched: &mut EventScheduler) -> SimResult<bool> {
        let delay = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            if state.phase != ServerPhase::Damaged {
                return Ok(false);
            }
            match &state.time_to_recovery {
                Some(dist) => checked_duration(&self.inner.id, state.rng.sample(dist)?)?,
                None => 0.0,
            }
        };
        self.schedule_recovery(sched, delay)
    }

    pub fn schedule_recovery(&self, sched: &mut EventScheduler, delay: f64) -> SimResult<bool> {
        let delay = checked_duration(&self.inner.id, delay)?;
        {
            let state = self.inner.state.borrow();
            if state.phase != ServerPhase::Damaged {
                debug!("[{}] recovery not scheduled - {}", self.inner.id, state.phase);
                return Ok(false);
            }
        }

        self.schedule_pending(sched, PendingKind::Recovered, delay, 0.0)?;
        self.inner.state.borrow_mut().phase = ServerPhase::Recovering;
        info!("[{}] recovering, back in {:.3}", self.inner.id, delay);
        self.notify(sched, &self.inner.state_changed);
        Ok(true)
    }

    fn offer_material(&self, sched: &mut EventScheduler, material: M, pushed: bool) -> SimResult<Offer<M>> {
        let reason = {
            let state = self.inner.state.borrow();
            if pushed && !state.options.allow_push {
                Some("push not allowed")
            } else if !state.accepts_material() {
                Some("under maintenance")
            } else if !state.is_usable(&material) {
                Some("material not usable")
            } else {
                None
            }
        };

        if let Some(reason) = reason {
            debug!("[{}] rejected material - {}", self.inner.id, reason);
            self.notify(sched, &self.inner.item_not_accepted);
            return Ok(Offer::Rejected(material));
        }

        let count = {
            let mut state = self.inner.state.borrow_mut();
            state.current_material.push(material);
            state.current_material.len()
        };
        debug!("[{}] accepted material ({} pieces)", self.inner.id, count);
        self.continue_if_ready(sched)?;
        Ok(Offer::Accepted)
    }

    /// Take usable material from the connected buffers until the batch is complete
    fn pull_material(&self, sched: &mut EventScheduler) -> SimResult<()> {
        let sources: Vec<Buffer<M>> = self.inner.sources.borrow().clone();
        if sources.is_empty() {
            return Ok(());
        }

        loop {
            {
                let state = self.inner.state.borrow();
                if !state.accepts_material() || state.is_complete() {
                    return Ok(());
                }
            }

            let mut pulled = false;
            for buffer in &sources {
                let usable = buffer.peek_with(|m| self.inner.state.borrow().is_usable(m));
                if usable != Some(true) {
                    continue;
                }
                if let Some(material) = buffer.get(sched) {
                    let mut state = self.inner.state.borrow_mut();
                    state.current_material.push(material);
                    pulled = true;
                    break;
                }
            }
            if !pulled {
                return Ok(());
            }
        }
    }

    fn refill(&self, sched: &mut EventScheduler) -> SimResult<()> {
        self.pull_material(sched)?;
        self.continue_if_ready(sched)
    }

    fn continue_if_ready(&self, sched: &mut EventScheduler) -> SimResult<()> {
        let ready = {
            let state = self.inner.state.borrow();
            state.options.auto_continue && state.phase == ServerPhase::Idle && !state.stopped && state.can_run()
        };
        if ready {
            self.begin_run(sched)?;
        }
        Ok(())
    }

    /// Commit material and schedule whichever of finish/failure comes first
    fn begin_run(&self, sched: &mut EventScheduler) -> SimResult<()> {
        let (kind, delay, machining) = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;

            let machining = match state.interrupted.take() {
                Some(run) => {
                    state.active_material = run.material;
                    run.remaining
                }
                None => {
                    state.active_material = std::mem::take(&mut state.current_material);
                    match state.take_machining_time(&self.inner.id) {
                        Ok(duration) => duration,
                        Err(e) => {
                            state.current_material = std::mem::take(&mut state.active_material);
                            return Err(e);
                        }
                    }
                }
            };

            match state.remaining_to_failure {
                Some(ttf) if ttf < machining => {
                    state.remaining_to_failure = None;
                    (PendingKind::Failed, ttf, machining)
                }
                Some(ttf) => {
                    state.remaining_to_failure = Some(ttf - machining);
                    (PendingKind::Finished, machining, machining)
                }
                None => (PendingKind::Finished, machining, machining),
            }
        };

        self.schedule_pending(sched, kind, delay, machining)?;
        {
            let mut state = self.inner.state.borrow_mut();
            state.phase = ServerPhase::Working;
            state.stats.runs_started += 1;
        }
        info!(
            "[{}] started run ({} pieces, {} in {:.3})",
            self.inner.id,
            self.active_material_len(),
            kind.label(),
            delay
        );
        self.notify(sched, &self.inner.state_changed);
        Ok(())
    }

    fn schedule_pending(&self, sched: &mut EventScheduler, kind: PendingKind, delay: f64, machining: f64) -> SimResult<()> {
        let token = {
            let mut state = self.inner.state.borrow_mut();
            state.next_token += 1;
            state.next_token
        };

        let weak = Rc::downgrade(&self.inner);
        let event = SimEvent::new(self.inner.id.clone(), kind.label(), move |s: &mut EventScheduler| {
            match Server::from_weak(&weak) {
                Some(server) => server.fire(s, token),
                None => Ok(()),
            }
        });
        let handle = sched.add_event(delay, event)?;
        let scheduled_at = sched.event_time(handle).unwrap_or_else(|| sched.now());

        self.inner.state.borrow_mut().pending = Some(Pending {
            handle,
            token,
            kind,
            started_at: sched.now(),
            scheduled_at,
            machining,
        });
        Ok(())
    }

    /// Dispatch a fired event; events left over from before a reset are ignored
    fn fire(&self, sched: &mut EventScheduler, token: u64) -> SimResult<()> {
        let pending = {
            let mut state = self.inner.state.borrow_mut();
            match state.pending.take() {
                Some(p) if p.token == token => p,
                other => {
                    state.pending = other;
                    debug!("[{}] ignoring stale event", self.inner.id);
                    return Ok(());
                }
            }
        };

        match pending.kind {
            PendingKind::Finished => self.handle_finished(sched),
            PendingKind::Failed => self.handle_failed(sched, pending),
            PendingKind::Recovered => self.handle_recovered(sched),
        }
    }

    fn handle_finished(&self, sched: &mut EventScheduler) -> SimResult<()> {
        let product = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            state.phase = ServerPhase::Idle;
            let batch = std::mem::take(&mut state.active_material);
            let product = state.factory.produce(batch, &state.data);
            state.stats.products_made += 1;
            if state.next_machining.is_none() {
                state.sample_next_machining(&self.inner.id)?;
            }
            product
        };
        info!("[{}] finished product #{}", self.inner.id, self.stats().products_made);

        if let Offer::Rejected(_) = self.inner.outlet.emit(sched, product)? {
            if self.inner.outlet.is_connected() {
                warn!("[{}] no downstream receiver accepted the product - dropped", self.inner.id);
                self.inner.state.borrow_mut().stats.discarded_products += 1;
            }
        }

        self.notify(sched, &self.inner.product_finished);
        self.notify(sched, &self.inner.state_changed);
        self.refill(sched)
    }

    fn handle_failed(&self, sched: &mut EventScheduler, pending: Pending) -> SimResult<()> {
        let auto_recover = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            state.phase = ServerPhase::Damaged;
            state.stats.failures += 1;

            let elapsed = sched.now().as_f64() - pending.started_at.as_f64();
            let remaining = (pending.machining - elapsed).max(0.0);
            let material = std::mem::take(&mut state.active_material);
            if state.options.continue_product_after_failure {
                state.interrupted = Some(InterruptedRun { material, remaining });
            } else {
                warn!(
                    "[{}] failure scrapped a batch of {} pieces",
                    self.inner.id,
                    material.len()
                );
                state.stats.scrapped_batches += 1;
            }
            state.sample_failure(&self.inner.id)?;
            state.options.auto_recover
        };
        warn!("[{}] failed at {}", self.inner.id, sched.now());

        self.notify(sched, &self.inner.failed);
        self.notify(sched, &self.inner.state_changed);
        if auto_recover {
            self.recover(sched)?;
        }
        Ok(())
    }

    fn handle_recovered(&self, sched: &mut EventScheduler) -> SimResult<()> {
        let restart = {
            let mut state = self.inner.state.borrow_mut();
            state.phase = ServerPhase::Idle;
            state.stats.recoveries += 1;
            state.options.auto_restart && !state.stopped
        };
        info!("[{}] recovered", self.inner.id);
        self.notify(sched, &self.inner.recovered);
        self.notify(sched, &self.inner.state_changed);

        if restart {
            self.pull_material(sched)?;
            if self.inner.state.borrow().can_run() {
                self.begin_run(sched)?;
            }
        }
        Ok(())
    }

    fn notify(&self, sched: &mut EventScheduler, signal: &Signal<ServerNotice>) {
        let notice = {
            let state = self.inner.state.borrow();
            ServerNotice {
                server: self.inner.id.clone(),
                phase: state.phase,
                stopped: state.stopped,
                time: sched.now(),
            }
        };
        if let Err(e) = signal.raise(sched, &self.inner.id, notice) {
            error!("[{}] failed to raise {}: {}", self.inner.id, signal.name(), e);
        }
    }

    fn from_weak(weak: &Weak<ServerInner<M, P, D>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl<M: 'static, P: 'static, D: 'static> Identifiable for Server<M, P, D> {
    fn entity_id(&self) -> &EntityId {
        &self.inner.id
    }
}

impl<M: 'static, P: 'static, D: 'static> Resettable for Server<M, P, D> {
    /// Drop all material, cancel the pending event and resample the first
    /// machining and failure intervals
    fn reset(&self, sched: &mut EventScheduler) -> SimResult<()> {
        let pending = self.inner.state.borrow().pending;
        if let Some(pending) = pending {
            if let Err(e) = sched.remove_event(pending.handle) {
                debug!("[{}] pending event left to expire: {}", self.inner.id, e);
            }
        }

        {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            state.pending = None;
            state.phase = ServerPhase::Idle;
            state.stopped = false;
            state.current_material.clear();
            state.active_material.clear();
            state.interrupted = None;
            state.stats = ServerStats::default();
            state.next_machining = None;
            state.sample_next_machining(&self.inner.id)?;
            state.sample_failure(&self.inner.id)?;
        }
        info!("[{}] reset", self.inner.id);
        self.notify(sched, &self.inner.state_changed);
        Ok(())
    }
}

impl<M: 'static, P: 'static, D: 'static> ItemSink<M> for Server<M, P, D> {
    fn inlet(&self) -> Inlet<M> {
        let weak = Rc::downgrade(&self.inner);
        Inlet::new(self.inner.id.clone(), move |sched, material| match Server::from_weak(&weak) {
            Some(server) => server.offer_material(sched, material, true),
            None => Ok(Offer::Rejected(material)),
        })
    }
}

impl<M: 'static, P: 'static, D: 'static> ItemSource<P> for Server<M, P, D> {
    fn outlet(&self) -> &Outlet<P> {
        &self.inner.outlet
    }
}

impl<M, P, D> std::fmt::Debug for Server<M, P, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Server")
            .field("id", &self.inner.id)
            .field("phase", &state.phase)
            .field("stopped", &state.stopped)
            .field("current_material", &state.current_material.len())
            .field("active_material", &state.active_material.len())
            .finish()
    }
}
