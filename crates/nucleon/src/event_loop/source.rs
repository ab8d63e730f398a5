//! Message sources subscribed to an [`EventLoop`].

use core::fmt;

use super::arena::Key;
use super::EventLoop;
use crate::queue::MessageSource;
use crate::sync::Arc;

/// Handle of one source subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub(super) Key);

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({}v{})", self.0.index, self.0.generation)
    }
}

/// Takes at most one item and dispatches it; `false` when the source was
/// empty.
pub(super) type Poll = Box<dyn FnMut(&mut EventLoop) -> bool>;

pub(super) struct Subscribed {
    /// Taken out while the callback runs.
    pub(super) poll: Option<Poll>,
    detach: Box<dyn Fn()>,
}

impl Subscribed {
    pub(super) fn new<S, F>(source: Arc<S>, mut callback: F) -> Self
    where
        S: MessageSource + 'static,
        F: FnMut(&mut EventLoop, S::Item) + 'static,
    {
        let polled = Arc::clone(&source);
        Self {
            poll: Some(Box::new(move |event_loop| match polled.take() {
                Some(item) => {
                    callback(event_loop, item);
                    true
                }
                None => false,
            })),
            detach: Box::new(move || source.detach()),
        }
    }

    pub(super) fn detach(&self) {
        (self.detach)();
    }
}
