//! Software timers owned by an [`EventLoop`].

use core::fmt;

use super::arena::Key;
use super::EventLoop;
use crate::port::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimerKind {
    /// Fires once per start, then disarms.
    OneShot,
    /// Re-arms one period after its previous due time.
    Periodic,
}

/// Handle of a timer allocated on one loop. Stale after
/// [`EventLoop::timer_free`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(super) Key);

impl fmt::Debug for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimerId({}v{})", self.0.index, self.0.generation)
    }
}

pub(super) type TimerCallback = Box<dyn FnMut(&mut EventLoop)>;

pub(super) struct Timer {
    pub(super) kind: TimerKind,
    /// Taken out while the callback runs.
    pub(super) callback: Option<TimerCallback>,
    pub(super) period: Option<Tick>,
    pub(super) due: Option<Tick>,
}

impl Timer {
    pub(super) fn new(kind: TimerKind, callback: TimerCallback) -> Self {
        Self {
            kind,
            callback: Some(callback),
            period: None,
            due: None,
        }
    }

    pub(super) fn arm(&mut self, now: Tick, period: Tick) {
        self.period = Some(period);
        self.due = Some(now.saturating_add(period));
    }

    /// Advances the schedule past a firing due at `due`.
    ///
    /// Periodic timers keep their nominal cadence: the next due time is
    /// derived from the previous due time, not from when the callback ran.
    pub(super) fn rearm_after(&mut self, due: Tick) {
        self.due = match (self.kind, self.period) {
            (TimerKind::Periodic, Some(period)) => Some(due.saturating_add(period)),
            _ => None,
        };
    }
}
