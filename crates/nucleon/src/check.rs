//! Fatal misuse reporting.
//!
//! A broken concurrency invariant (double lock, over-close, a stale timer
//! handle) cannot be continued past safely. The firmware halts with a
//! human-readable reason; on a host build the halt is a panic so tests can
//! observe it.

/// Logs `reason` and halts.
#[track_caller]
#[cold]
pub fn crash(reason: &str) -> ! {
    let location = core::panic::Location::caller();
    log::error!(target: "check", "fatal: {reason} ({location})");
    panic!("{reason}");
}

/// Halts with the formatted reason when `cond` does not hold.
///
/// ```should_panic
/// let holders = 0;
/// nucleon::check!(holders > 0, "record closed {} times too often", 1);
/// ```
#[macro_export]
macro_rules! check {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::check::crash(&::std::format!($($arg)+));
        }
    };
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::check::crash(::core::concat!("check failed: ", ::core::stringify!($cond)));
        }
    };
}
