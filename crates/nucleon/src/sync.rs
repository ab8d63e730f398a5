//! Lock types shared by the kernel primitives.
//!
//! Every primitive in this crate locks through `parking_lot`: its mutex never
//! poisons (a panicked holder is already a fatal halt here) and it supports
//! timed acquisition, which the scheduler boundary requires.

pub use std::sync::Arc;

pub type Mutex<T> = parking_lot::Mutex<T>;
pub type MutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;
pub type RwLock<T> = parking_lot::RwLock<T>;
pub type Condvar = parking_lot::Condvar;
