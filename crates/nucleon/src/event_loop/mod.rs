//! Cooperative event loop with software timers.
//!
//! One loop belongs to one execution context. [`EventLoop::run`] dispatches
//! one ready callback per iteration, in this order:
//!
//! 1. callbacks queued with [`EventLoop::pend`],
//! 2. the timer with the earliest due time, if it is due,
//! 3. the next message source holding an item, round-robin.
//!
//! With nothing ready the loop sleeps on its [`Signal`] until the soonest
//! timer is due, or until a source raises it. Callbacks receive the loop
//! itself and may start, stop, allocate or free timers, subscribe sources,
//! or [`stop`](EventLoop::stop) the loop.
//!
//! Timers and subscriptions live in tables owned by the loop; dropping the
//! loop frees every timer and detaches every source.

use core::fmt;
use core::marker::PhantomData;
use std::collections::VecDeque;

mod arena;
mod source;
mod timer;

pub use source::SourceId;
pub use timer::{TimerId, TimerKind};

use self::arena::Arena;
use self::source::Subscribed;
use self::timer::Timer;
use crate::check;
use crate::error::{Error, Result};
use crate::port::{Clock, HostClock, HostSignal, SimClock, Signal, Tick};
use crate::queue::MessageSource;
use crate::sync::Arc;

/// Loop sizing.
#[derive(Debug, Clone)]
pub struct EventLoopConfig {
    /// Shown in log records.
    pub name: &'static str,
    pub max_timers: usize,
    pub max_sources: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            name: "loop",
            max_timers: 16,
            max_sources: 8,
        }
    }
}

impl EventLoopConfig {
    pub fn builder() -> EventLoopConfigBuilder {
        EventLoopConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventLoopConfigBuilder {
    config: EventLoopConfig,
}

impl EventLoopConfigBuilder {
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Sets the size of the timer table.
    pub fn max_timers(mut self, max: usize) -> Self {
        self.config.max_timers = max;
        self
    }

    /// Sets the size of the source table.
    pub fn max_sources(mut self, max: usize) -> Self {
        self.config.max_sources = max;
        self
    }

    pub fn build(self) -> EventLoopConfig {
        self.config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Never run.
    Idle,
    Running,
    /// `run` returned after a `stop`.
    Stopped,
}

type Pending = Box<dyn FnOnce(&mut EventLoop)>;

pub struct EventLoop {
    config: EventLoopConfig,
    clock: Arc<dyn Clock>,
    signal: Arc<dyn Signal>,
    state: LoopState,
    stop_requested: bool,
    pending: VecDeque<Pending>,
    timers: Arena<Timer>,
    sources: Arena<Subscribed>,
    /// Slot where the next round-robin source scan starts.
    next_source: usize,
    /// Loops are tied to the context that created them.
    _not_send: PhantomData<*const ()>,
}

impl EventLoop {
    pub fn new(clock: Arc<dyn Clock>, signal: Arc<dyn Signal>, config: EventLoopConfig) -> Self {
        log::debug!(
            target: "event_loop",
            "`{}` created ({} timers, {} sources)",
            config.name,
            config.max_timers,
            config.max_sources
        );
        Self {
            timers: Arena::new(config.max_timers),
            sources: Arena::new(config.max_sources),
            config,
            clock,
            signal,
            state: LoopState::Idle,
            stop_requested: false,
            pending: VecDeque::new(),
            next_source: 0,
            _not_send: PhantomData,
        }
    }

    /// Loop on real time.
    pub fn host(config: EventLoopConfig) -> Self {
        Self::new(
            Arc::new(HostClock::new()),
            Arc::new(HostSignal::new()),
            config,
        )
    }

    /// Loop on simulated time driven through `clock`.
    pub fn simulated(clock: &SimClock, config: EventLoopConfig) -> Self {
        Self::new(Arc::new(clock.clone()), Arc::new(clock.signal()), config)
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// The signal the loop sleeps on. Raising it wakes the loop for one
    /// extra scan.
    pub fn signal(&self) -> Arc<dyn Signal> {
        Arc::clone(&self.signal)
    }

    /// Dispatches until a callback calls [`stop`](Self::stop).
    #[track_caller]
    pub fn run(&mut self) {
        check!(
            self.state != LoopState::Running,
            "event loop `{}` is already running",
            self.config.name
        );
        self.state = LoopState::Running;
        self.stop_requested = false;
        log::info!(target: "event_loop", "`{}` running", self.config.name);

        while !self.stop_requested {
            if let Some(callback) = self.pending.pop_front() {
                callback(self);
                continue;
            }

            let now = self.clock.now();
            let next_timer = self.next_due();
            if let Some((id, due)) = next_timer {
                if due <= now {
                    self.fire(id, due);
                    continue;
                }
            }

            if self.poll_sources() {
                continue;
            }

            let timeout = next_timer.map(|(_, due)| due - now);
            log::trace!(target: "event_loop", "`{}` idle for {timeout:?}", self.config.name);
            self.signal.wait(timeout);
        }

        self.state = LoopState::Stopped;
        log::info!(target: "event_loop", "`{}` stopped", self.config.name);
    }

    /// Makes [`run`](Self::run) return after the current callback.
    #[track_caller]
    pub fn stop(&mut self) {
        check!(
            self.state == LoopState::Running,
            "event loop `{}` stopped while not running",
            self.config.name
        );
        self.stop_requested = true;
    }

    /// Queues `callback` to run on this loop before any timer or source.
    pub fn pend<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut EventLoop) + 'static,
    {
        self.pending.push_back(Box::new(callback));
    }

    /// Subscribes `callback` to `source`. Each dispatch hands the callback
    /// exactly one item.
    pub fn subscribe<S, F>(&mut self, source: Arc<S>, callback: F) -> Result<SourceId>
    where
        S: MessageSource + 'static,
        F: FnMut(&mut EventLoop, S::Item) + 'static,
    {
        if self.sources.len() >= self.sources.capacity() {
            log::warn!(
                target: "event_loop",
                "`{}` source table full ({})",
                self.config.name,
                self.sources.capacity()
            );
            return Err(Error::Full);
        }
        source.attach(Arc::clone(&self.signal));
        let subscribed = Subscribed::new(source, callback);
        match self.sources.insert(subscribed) {
            Ok(key) => Ok(SourceId(key)),
            Err(subscribed) => {
                subscribed.detach();
                Err(Error::Full)
            }
        }
    }

    #[track_caller]
    pub fn unsubscribe(&mut self, id: SourceId) {
        match self.sources.remove(id.0) {
            Some(subscribed) => subscribed.detach(),
            None => check::crash(&format!(
                "event loop `{}` has no source {id:?}",
                self.config.name
            )),
        }
    }

    /// Allocates a stopped timer.
    pub fn timer_alloc<F>(&mut self, callback: F, kind: TimerKind) -> Result<TimerId>
    where
        F: FnMut(&mut EventLoop) + 'static,
    {
        match self.timers.insert(Timer::new(kind, Box::new(callback))) {
            Ok(key) => {
                log::debug!(target: "event_loop", "`{}` allocated {kind:?} timer", self.config.name);
                Ok(TimerId(key))
            }
            Err(_) => {
                log::warn!(
                    target: "event_loop",
                    "`{}` timer table full ({})",
                    self.config.name,
                    self.timers.capacity()
                );
                Err(Error::Full)
            }
        }
    }

    /// Arms the timer to fire `period` ticks from now; a running timer is
    /// rescheduled.
    #[track_caller]
    pub fn timer_start(&mut self, id: TimerId, period: Tick) {
        let now = self.clock.now();
        let timer = self.timer_mut(id);
        check!(
            period > 0 || timer.kind == TimerKind::OneShot,
            "periodic timer started with a zero period"
        );
        timer.arm(now, period);
    }

    /// Re-arms the timer with the period of its last start.
    #[track_caller]
    pub fn timer_restart(&mut self, id: TimerId) {
        let now = self.clock.now();
        let timer = self.timer_mut(id);
        match timer.period {
            Some(period) => timer.arm(now, period),
            None => check::crash("timer restarted before it was ever started"),
        }
    }

    #[track_caller]
    pub fn timer_stop(&mut self, id: TimerId) {
        self.timer_mut(id).due = None;
    }

    /// Releases the timer. `id` is stale afterwards. A timer may free itself
    /// from its own callback.
    #[track_caller]
    pub fn timer_free(&mut self, id: TimerId) {
        if self.timers.remove(id.0).is_none() {
            stale_timer(self.config.name, id);
        }
    }

    #[track_caller]
    pub fn timer_is_running(&self, id: TimerId) -> bool {
        self.timer(id).due.is_some()
    }

    /// Tick at which the timer next fires, if it is running.
    #[track_caller]
    pub fn timer_expire_time(&self, id: TimerId) -> Option<Tick> {
        self.timer(id).due
    }

    #[track_caller]
    pub fn timer_period(&self, id: TimerId) -> Option<Tick> {
        self.timer(id).period
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    #[track_caller]
    fn timer(&self, id: TimerId) -> &Timer {
        match self.timers.get(id.0) {
            Some(timer) => timer,
            None => stale_timer(self.config.name, id),
        }
    }

    #[track_caller]
    fn timer_mut(&mut self, id: TimerId) -> &mut Timer {
        let name = self.config.name;
        match self.timers.get_mut(id.0) {
            Some(timer) => timer,
            None => stale_timer(name, id),
        }
    }

    /// Earliest armed timer; ties go to the lower slot.
    fn next_due(&self) -> Option<(TimerId, Tick)> {
        self.timers
            .iter()
            .filter_map(|(key, timer)| timer.due.map(|due| (due, key)))
            .min()
            .map(|(due, key)| (TimerId(key), due))
    }

    fn fire(&mut self, id: TimerId, due: Tick) {
        let Some(timer) = self.timers.get_mut(id.0) else {
            return;
        };
        timer.rearm_after(due);
        let Some(mut callback) = timer.callback.take() else {
            return;
        };
        log::trace!(target: "event_loop", "`{}` firing {id:?} due at {due}", self.config.name);

        callback(self);

        // The callback may have freed the timer, or freed it and handed the
        // slot to a new one; only the timer that fired gets its callback back.
        if let Some(timer) = self.timers.get_mut(id.0) {
            if timer.callback.is_none() {
                timer.callback = Some(callback);
            }
        }
    }

    /// Dispatches one item from the next non-empty source.
    fn poll_sources(&mut self) -> bool {
        let slots = self.sources.slot_count();
        for offset in 0..slots {
            let index = (self.next_source + offset) % slots;
            let Some(key) = self.sources.key_at(index) else {
                continue;
            };
            let Some(mut poll) = self.sources.get_mut(key).and_then(|s| s.poll.take()) else {
                continue;
            };

            let dispatched = poll(self);

            if let Some(subscribed) = self.sources.get_mut(key) {
                if subscribed.poll.is_none() {
                    subscribed.poll = Some(poll);
                }
            }
            if dispatched {
                self.next_source = index + 1;
                return true;
            }
        }
        false
    }
}

#[track_caller]
fn stale_timer(name: &str, id: TimerId) -> ! {
    check::crash(&format!("event loop `{name}` has no timer {id:?}"))
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("name", &self.config.name)
            .field("state", &self.state)
            .field("timers", &self.timers.len())
            .field("sources", &self.sources.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        let timers = self.timers.drain().len();
        let sources = self.sources.drain();
        for subscribed in &sources {
            subscribed.detach();
        }
        log::debug!(
            target: "event_loop",
            "`{}` dropped, freed {timers} timers and {} sources",
            self.config.name,
            sources.len()
        );
    }
}
