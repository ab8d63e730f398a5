//! Synchronous broadcast event bus.
//!
//! A [`PubSub`] delivers each published value to every live subscriber, once
//! and in subscription order, on the publisher's own context. There is no
//! queueing: a slow subscriber slows the publisher down.
//!
//! Callbacks may publish on the same bus (the subscriber list is held with a
//! recursive read lock). Subscribing or unsubscribing on the same bus from
//! inside one of its callbacks deadlocks and must not be done.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::check;
use crate::error::{Error, Result};
use crate::sync::{Arc, RwLock};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

static NEXT_BUS_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct Subscriber<T> {
    id: u64,
    callback: Callback<T>,
    isr_safe: bool,
}

pub struct PubSub<T> {
    id: u64,
    pub(crate) subscribers: RwLock<Vec<Subscriber<T>>>,
    next_subscriber: AtomicU64,
}

/// Handle of one subscription. Give it back with [`PubSub::unsubscribe`].
#[must_use = "a subscription stays live until it is passed to `unsubscribe`"]
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    bus: u64,
    id: u64,
}

/// Marks a callback as safe to run in interrupt context: it must not block,
/// allocate or take locks.
pub struct IsrFn<F>(pub F);

impl<T> PubSub<T> {
    pub fn new() -> Self {
        Self {
            id: NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed),
            subscribers: RwLock::new(Vec::new()),
            next_subscriber: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.insert(Arc::new(callback), false)
    }

    /// Subscribes a callback that may also be reached through
    /// [`publish_from_isr`](Self::publish_from_isr).
    pub fn subscribe_isr<F>(&self, callback: IsrFn<F>) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.insert(Arc::new(callback.0), true)
    }

    /// Removes a subscription. Once this returns the callback is not invoked
    /// again.
    #[track_caller]
    pub fn unsubscribe(&self, subscription: Subscription) {
        check!(
            subscription.bus == self.id,
            "subscription {} belongs to bus {}, not bus {}",
            subscription.id,
            subscription.bus,
            self.id
        );
        let mut subscribers = self.subscribers.write();
        let position = subscribers
            .iter()
            .position(|subscriber| subscriber.id == subscription.id);
        match position {
            Some(position) => {
                subscribers.remove(position);
            }
            None => check::crash("subscription is no longer live"),
        }
        log::trace!(
            target: "pubsub",
            "bus {} dropped subscriber {}",
            self.id,
            subscription.id
        );
    }

    /// Invokes every live callback with `value`.
    pub fn publish(&self, value: &T) {
        let subscribers = self.subscribers.read_recursive();
        for subscriber in subscribers.iter() {
            (subscriber.callback)(value);
        }
    }

    /// Interrupt-context publish. Never blocks: returns [`Error::Busy`] when
    /// the subscriber list is being changed.
    ///
    /// Every live subscriber must have come through
    /// [`subscribe_isr`](Self::subscribe_isr).
    #[track_caller]
    pub fn publish_from_isr(&self, value: &T) -> Result<()> {
        let subscribers = self.subscribers.try_read_recursive().ok_or(Error::Busy)?;
        check!(
            subscribers.iter().all(|subscriber| subscriber.isr_safe),
            "bus {} has subscribers that are not interrupt-safe",
            self.id
        );
        for subscriber in subscribers.iter() {
            (subscriber.callback)(value);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, callback: Callback<T>, isr_safe: bool) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push(Subscriber {
            id,
            callback,
            isr_safe,
        });
        log::trace!(target: "pubsub", "bus {} added subscriber {id}", self.id);
        Subscription { bus: self.id, id }
    }
}

impl<T> Default for PubSub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PubSub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSub")
            .field("id", &self.id)
            .field("subscribers", &self.len())
            .finish()
    }
}

impl<T> Drop for PubSub<T> {
    fn drop(&mut self) {
        let live = self.subscribers.get_mut().len();
        if live > 0 && !std::thread::panicking() {
            check::crash(&format!(
                "bus {} dropped with {live} live subscriptions",
                self.id
            ));
        }
    }
}
