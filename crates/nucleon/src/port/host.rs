//! Real-time port for hosted builds.

use std::time::Instant;

use super::{ticks_to_duration, Clock, Signal, Tick, NANOS_PER_SEC, TICK_RATE_HZ};
use crate::sync::{Condvar, Mutex};

/// Tick source counting from the moment it was created.
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    epoch: Instant,
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HostClock {
    fn now(&self) -> Tick {
        let elapsed = self.epoch.elapsed().as_nanos();
        (elapsed * TICK_RATE_HZ as u128 / NANOS_PER_SEC) as Tick
    }
}

/// Condition-variable backed binary semaphore.
#[derive(Default)]
pub struct HostSignal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl HostSignal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Signal for HostSignal {
    fn raise(&self) {
        let mut raised = self.raised.lock();
        *raised = true;
        self.cond.notify_one();
    }

    fn wait(&self, timeout: Option<Tick>) -> bool {
        let mut raised = self.raised.lock();
        match timeout {
            None => {
                while !*raised {
                    self.cond.wait(&mut raised);
                }
            }
            Some(ticks) => {
                let deadline = Instant::now() + ticks_to_duration(ticks);
                while !*raised {
                    if self.cond.wait_until(&mut raised, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        core::mem::replace(&mut *raised, false)
    }
}
