//! Low-power prevention ("insomnia").
//!
//! While the level is above zero the idle hook must not enter deep sleep:
//! some peripheral transaction depends on clocks that sleep would gate. Bus
//! transactions hold a level for their whole duration.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::check;

#[derive(Default)]
pub struct Insomnia {
    level: AtomicU32,
}

/// One held insomnia level. Dropping it lets the system sleep again.
#[must_use = "sleep is allowed again as soon as the guard is dropped"]
pub struct InsomniaGuard<'a> {
    insomnia: &'a Insomnia,
}

static GLOBAL: Insomnia = Insomnia::new();

impl Insomnia {
    pub const fn new() -> Self {
        Self {
            level: AtomicU32::new(0),
        }
    }

    /// The process-wide counter consulted by the idle hook.
    pub fn global() -> &'static Insomnia {
        &GLOBAL
    }

    pub fn enter(&self) -> InsomniaGuard<'_> {
        let previous = self.level.fetch_add(1, Ordering::AcqRel);
        check!(previous < u32::MAX, "insomnia level overflow");
        log::trace!(target: "power", "insomnia level {}", previous + 1);
        InsomniaGuard { insomnia: self }
    }

    /// Gives back a level taken with [`InsomniaGuard::leak`].
    #[track_caller]
    pub fn exit(&self) {
        let result = self
            .level
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |level| {
                level.checked_sub(1)
            });
        match result {
            Ok(previous) => log::trace!(target: "power", "insomnia level {}", previous - 1),
            Err(_) => check::crash("insomnia exited more times than entered"),
        }
    }

    pub fn level(&self) -> u32 {
        self.level.load(Ordering::Acquire)
    }

    pub fn is_sleep_allowed(&self) -> bool {
        self.level() == 0
    }
}

impl fmt::Debug for Insomnia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Insomnia")
            .field("level", &self.level())
            .finish()
    }
}

impl InsomniaGuard<'_> {
    /// Keeps the level held past the guard; pair with [`Insomnia::exit`].
    pub fn leak(self) {
        core::mem::forget(self);
    }
}

impl Drop for InsomniaGuard<'_> {
    fn drop(&mut self) {
        self.insomnia.exit();
    }
}
