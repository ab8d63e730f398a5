//! Recoverable failures.
//!
//! Only contention timeouts and resource exhaustion are reported as values;
//! misuse goes through [`crate::check::crash`] instead.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The caller's timeout elapsed before the resource became available.
    #[error("operation timed out")]
    Timeout,
    /// A fixed-capacity table or queue has no room left.
    #[error("capacity exhausted")]
    Full,
    /// Nothing is available to take.
    #[error("nothing available")]
    Empty,
    /// The named record has no live entry.
    #[error("record is not open")]
    NotOpen,
    /// The resource is being mutated and the caller cannot wait.
    #[error("resource busy")]
    Busy,
}

pub type Result<T> = core::result::Result<T, Error>;
