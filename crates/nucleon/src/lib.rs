//! # nucleon
//!
//! Kernel primitives shared by every driver, protocol worker and UI task of
//! the firmware. The scheduler itself is an external collaborator reached
//! through the [`port`] boundary; everything else in this crate is built on
//! top of it.
//!
//! ## Module Overview
//! - [`port`]       – Tick source and wakeup signal supplied by the scheduler.
//! - [`ring`]       – Single-producer/single-consumer byte ring.
//! - [`guarded`]    – Values behind a timed mutual-exclusion lock.
//! - [`record`]     – Named, reference-counted service registry.
//! - [`pubsub`]     – Synchronous broadcast event bus.
//! - [`queue`]      – Bounded message queues usable as loop sources.
//! - [`power`]      – Low-power prevention counter ("insomnia").
//! - [`event_loop`] – Cooperative dispatcher with software timers.
//! - [`check`]      – Fatal misuse reporting.
//!
//! Timeouts and exhaustion are reported through [`Error`]; misuse halts via
//! [`check::crash`].

pub mod check;
pub mod error;
pub mod event_loop;
pub mod guarded;
pub mod port;
pub mod power;
pub mod pubsub;
pub mod queue;
pub mod record;
pub mod ring;
mod sync;

pub use error::{Error, Result};
pub use event_loop::{EventLoop, EventLoopConfig, LoopState, SourceId, TimerId, TimerKind};
pub use guarded::{Guarded, GuardedRef};
pub use port::{Clock, Signal, Tick, Timeout, TICK_RATE_HZ};
pub use power::{Insomnia, InsomniaGuard};
pub use pubsub::{IsrFn, PubSub, Subscription};
pub use queue::{MessageQueue, MessageSource};
pub use record::{Record, Registry, RegistryConfig};
pub use ring::{Ring, RingReader, RingWriter};

#[cfg(test)]
mod tests;
