//! Bounded message queues usable as event loop sources.
//!
//! [`MessageSource`] is what [`EventLoop::subscribe`](crate::EventLoop::subscribe)
//! consumes: something that hands out one item at a time and raises the
//! loop's signal when new items arrive. [`MessageQueue`] is the stock
//! implementation; thread consumers can also block on it directly.

use core::fmt;
use std::collections::VecDeque;
use std::time::Instant;

use crate::check;
use crate::error::{Error, Result};
use crate::port::{Signal, Timeout};
use crate::sync::{Arc, Condvar, Mutex};

/// A readiness source an event loop can poll.
pub trait MessageSource: Send + Sync {
    type Item;

    /// Removes and returns the next item, if any.
    fn take(&self) -> Option<Self::Item>;

    /// Starts raising `signal` whenever an item becomes available. Items
    /// already queued raise it immediately.
    fn attach(&self, signal: Arc<dyn Signal>);

    fn detach(&self);
}

struct Inner<T> {
    items: VecDeque<T>,
    signal: Option<Arc<dyn Signal>>,
}

/// Bounded FIFO. [`put`](Self::put) never blocks, so producers may run in
/// interrupt context.
pub struct MessageQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> MessageQueue<T> {
    pub fn new(capacity: usize) -> Self {
        check!(capacity > 0, "message queue capacity must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                signal: None,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Appends `message`, or returns [`Error::Full`] without waiting.
    pub fn put(&self, message: T) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.items.len() >= self.capacity {
            return Err(Error::Full);
        }
        inner.items.push_back(message);
        let signal = inner.signal.clone();
        drop(inner);

        self.available.notify_one();
        if let Some(signal) = signal {
            signal.raise();
        }
        Ok(())
    }

    pub fn get(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Waits up to `timeout` for a message. Only for thread consumers.
    pub fn get_timeout(&self, timeout: Timeout) -> Result<T> {
        let mut inner = self.inner.lock();
        let deadline = match timeout {
            Timeout::After(limit) => Some(Instant::now() + limit),
            _ => None,
        };
        loop {
            if let Some(message) = inner.items.pop_front() {
                return Ok(message);
            }
            match (timeout, deadline) {
                (Timeout::Immediate, _) => return Err(Error::Timeout),
                (_, Some(deadline)) => {
                    if self.available.wait_until(&mut inner, deadline).timed_out() {
                        return inner.items.pop_front().ok_or(Error::Timeout);
                    }
                }
                _ => self.available.wait(&mut inner),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every queued message.
    pub fn reset(&self) {
        self.inner.lock().items.clear();
    }
}

impl<T: Send> MessageSource for MessageQueue<T> {
    type Item = T;

    fn take(&self) -> Option<T> {
        self.get()
    }

    #[track_caller]
    fn attach(&self, signal: Arc<dyn Signal>) {
        let mut inner = self.inner.lock();
        check!(
            inner.signal.is_none(),
            "message queue is already attached to an event loop"
        );
        let pending = !inner.items.is_empty();
        inner.signal = Some(Arc::clone(&signal));
        drop(inner);
        if pending {
            signal.raise();
        }
    }

    fn detach(&self) {
        self.inner.lock().signal = None;
    }
}

impl<T> fmt::Debug for MessageQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MessageQueue")
            .field("len", &inner.items.len())
            .field("capacity", &self.capacity)
            .field("attached", &inner.signal.is_some())
            .finish()
    }
}
