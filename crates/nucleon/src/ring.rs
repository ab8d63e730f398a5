//! Single-producer/single-consumer byte ring.
//!
//! The usual hand-off from an interrupt (writer) to a thread (reader). Each
//! side only ever advances its own index and only reads the other one, so no
//! lock is needed as long as there is exactly one [`RingWriter`] and one
//! [`RingReader`], which [`Ring::split`] guarantees by construction.
//!
//! Transfers are partial: `push` writes what fits and `pull` reads what is
//! there. The ring never blocks and never fails; callers that care about lost
//! data keep their own overrun flag.

use core::cell::UnsafeCell;
use core::fmt;
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::sync::Arc;

struct Shared {
    /// `capacity + 1` slots; the spare slot tells full from empty.
    buf: Box<[UnsafeCell<u8>]>,
    /// Next slot to write. Owned by the writer.
    head: AtomicUsize,
    /// Next slot to read. Owned by the reader.
    tail: AtomicUsize,
}

// SAFETY: the writer only touches slots in [head, tail - 1) and the reader
// only slots in [tail, head); the index handshake (release store after the
// copy, acquire load before it) keeps the two ranges disjoint.
unsafe impl Sync for Shared {}

impl Shared {
    fn new(capacity: usize) -> Self {
        let slots = capacity
            .checked_add(1)
            .unwrap_or_else(|| crate::check::crash("ring capacity overflows usize"));
        Self {
            buf: (0..slots).map(|_| UnsafeCell::new(0)).collect(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn slots(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots() - 1
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.buf.as_ptr())
    }

    fn used(&self, head: usize, tail: usize) -> usize {
        (head + self.slots() - tail) % self.slots()
    }

    fn read_space(&self) -> usize {
        self.used(
            self.head.load(Ordering::Acquire),
            self.tail.load(Ordering::Acquire),
        )
    }

    fn push(&self, data: &[u8]) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let free = self.capacity() - self.used(head, tail);
        let count = data.len().min(free);
        if count == 0 {
            return 0;
        }

        let first = count.min(self.slots() - head);
        // SAFETY: [head, head + count) modulo slots lies in the free region,
        // which the reader does not touch until `head` is published below.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.base().add(head), first);
            ptr::copy_nonoverlapping(data.as_ptr().add(first), self.base(), count - first);
        }

        self.head
            .store((head + count) % self.slots(), Ordering::Release);
        count
    }

    fn pull(&self, out: &mut [u8]) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let count = out.len().min(self.used(head, tail));
        if count == 0 {
            return 0;
        }

        let first = count.min(self.slots() - tail);
        // SAFETY: [tail, tail + count) modulo slots was published by the
        // writer's release store of `head`, and the writer will not reuse it
        // until `tail` moves past it below.
        unsafe {
            ptr::copy_nonoverlapping(self.base().add(tail), out.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(self.base(), out.as_mut_ptr().add(first), count - first);
        }

        self.tail
            .store((tail + count) % self.slots(), Ordering::Release);
        count
    }

    fn clear(&self) {
        let head = self.head.load(Ordering::Acquire);
        self.tail.store(head, Ordering::Release);
    }
}

/// Fixed-capacity byte ring, not yet split into its two ends.
///
/// Usable directly from a single context through `&mut self`.
pub struct Ring {
    shared: Arc<Shared>,
}

impl Ring {
    /// Creates a ring holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared::new(capacity)),
        }
    }

    /// Splits the ring into its writing and reading ends.
    pub fn split(self) -> (RingWriter, RingReader) {
        (
            RingWriter {
                shared: Arc::clone(&self.shared),
            },
            RingReader {
                shared: self.shared,
            },
        )
    }

    pub fn push(&mut self, data: &[u8]) -> usize {
        self.shared.push(data)
    }

    pub fn pull(&mut self, out: &mut [u8]) -> usize {
        self.shared.pull(out)
    }

    pub fn read_space(&self) -> usize {
        self.shared.read_space()
    }

    pub fn write_space(&self) -> usize {
        self.shared.capacity() - self.shared.read_space()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn clear(&mut self) {
        self.shared.clear();
    }
}

impl fmt::Debug for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ring")
            .field("capacity", &self.capacity())
            .field("read_space", &self.read_space())
            .finish()
    }
}

/// Writing end. Safe to drive from an interrupt.
pub struct RingWriter {
    shared: Arc<Shared>,
}

impl RingWriter {
    /// Writes as many bytes of `data` as fit and returns that count.
    pub fn push(&mut self, data: &[u8]) -> usize {
        self.shared.push(data)
    }

    pub fn write_space(&self) -> usize {
        self.shared.capacity() - self.shared.read_space()
    }

    pub fn is_full(&self) -> bool {
        self.write_space() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

/// Reading end.
pub struct RingReader {
    shared: Arc<Shared>,
}

impl RingReader {
    /// Reads up to `out.len()` bytes and returns how many were read.
    pub fn pull(&mut self, out: &mut [u8]) -> usize {
        self.shared.pull(out)
    }

    pub fn read_space(&self) -> usize {
        self.shared.read_space()
    }

    pub fn is_empty(&self) -> bool {
        self.read_space() == 0
    }

    /// Discards everything not yet read.
    pub fn clear(&mut self) {
        self.shared.clear();
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}
