//! Simulated-time port.
//!
//! Time only moves when a context sleeps: a timed [`SimSignal::wait`] with no
//! pending raise jumps the shared [`SimClock`] forward by the full timeout.
//! Runs are therefore exact and repeatable, which is what timer tests need.
//! The port is meant for a single simulated context; raising a `SimSignal`
//! from another thread works but makes the timeline depend on OS scheduling.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::{Clock, Signal, Tick};
use crate::check;
use crate::sync::Arc;

/// Shared simulated tick counter. Clones observe the same time.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(tick: Tick) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(tick)),
        }
    }

    /// Moves time forward by `ticks`.
    pub fn advance(&self, ticks: Tick) {
        self.now.fetch_add(ticks, Ordering::AcqRel);
    }

    /// Creates a signal whose timed waits drive this clock.
    pub fn signal(&self) -> SimSignal {
        SimSignal {
            clock: self.clone(),
            raised: AtomicBool::new(false),
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> Tick {
        self.now.load(Ordering::Acquire)
    }
}

/// Binary semaphore on simulated time.
#[derive(Debug)]
pub struct SimSignal {
    clock: SimClock,
    raised: AtomicBool,
}

impl Signal for SimSignal {
    fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    fn wait(&self, timeout: Option<Tick>) -> bool {
        if self.raised.swap(false, Ordering::AcqRel) {
            return true;
        }
        match timeout {
            Some(ticks) => {
                self.clock.advance(ticks);
                false
            }
            None => check::crash("simulated context waits forever with nothing scheduled"),
        }
    }
}
