//! Scheduler boundary.
//!
//! The scheduler (threads, semaphores, the tick interrupt) is not part of this
//! crate. The kernel primitives only need two things from it: a monotonic
//! tick count ([`Clock`]) and a per-context binary semaphore the event loop can
//! sleep on ([`Signal`]). Locks come from `parking_lot`, see `sync`.
//!
//! Two ports are provided: [`host`] runs on real time and real threads,
//! [`sim`] runs on simulated time for deterministic tests.

use core::time::Duration;

pub mod host;
pub mod sim;

pub use host::{HostClock, HostSignal};
pub use sim::{SimClock, SimSignal};

/// Monotonic tick count.
pub type Tick = u64;

/// Scheduler tick rate.
pub const TICK_RATE_HZ: u32 = 1000;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Converts a tick count to wall-clock time.
pub fn ticks_to_duration(ticks: Tick) -> Duration {
    let nanos = ticks as u128 * NANOS_PER_SEC / TICK_RATE_HZ as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Converts wall-clock time to ticks, rounding up so a non-zero wait never
/// becomes a zero-tick wait.
pub fn duration_to_ticks(duration: Duration) -> Tick {
    let scaled = duration.as_nanos() * TICK_RATE_HZ as u128;
    let ticks = scaled.div_ceil(NANOS_PER_SEC);
    ticks.min(Tick::MAX as u128) as Tick
}

/// Monotonic tick source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Tick;
}

/// Binary semaphore owned by one execution context.
///
/// Any context may [`raise`](Signal::raise) it, including interrupts; only the
/// owning context waits on it.
pub trait Signal: Send + Sync {
    /// Sets the signal and wakes the waiter, if any.
    fn raise(&self);

    /// Blocks until the signal is raised or `timeout` ticks elapse
    /// (`None` waits forever). Returns `true` when raised; the signal is
    /// cleared on return.
    fn wait(&self, timeout: Option<Tick>) -> bool;
}

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Timeout {
    /// Do not wait at all.
    Immediate,
    /// Wait at most this long.
    After(Duration),
    /// Wait until the resource becomes available.
    Forever,
}

impl Timeout {
    /// Timeout expressed in scheduler ticks.
    pub fn ticks(ticks: Tick) -> Self {
        if ticks == 0 {
            Self::Immediate
        } else {
            Self::After(ticks_to_duration(ticks))
        }
    }

    pub fn millis(ms: u64) -> Self {
        Self::After(Duration::from_millis(ms))
    }
}

impl From<Duration> for Timeout {
    fn from(value: Duration) -> Self {
        if value.is_zero() {
            Self::Immediate
        } else {
            Self::After(value)
        }
    }
}
