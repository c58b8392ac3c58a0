//! # Inter-Task Channels
//!
//! The two primitives tasks use to exchange data:
//!
//! - [`Share`]: a single slot. Writes overwrite and reads copy the latest value.
//! - [`Queue`]: a bounded FIFO with an overflow policy fixed at construction.
//!
//! Neither type locks. Both rely on the scheduler running exactly one task
//! body at a time, so a `put` or `get` always completes before another task
//! can observe the channel. Both are `!Sync` (they are built on `Cell` and
//! `RefCell`), which keeps them out of interrupt handlers at compile time.
//! Values an ISR writes belong in [`crate::sync`] instead.
//!
//! Channels are created before the tasks that use them and handed to each
//! task by shared reference.

use core::cell::{Cell, RefCell};

use heapless::Deque;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Share
// ---------------------------------------------------------------------------

/// Single-slot inter-task value.
pub struct Share<T: Copy> {
    name: &'static str,
    slot: Cell<Option<T>>,
    puts: Cell<u32>,
}

impl<T: Copy> Share<T> {
    /// Create an empty share. `get` returns `None` until the first `put`.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Cell::new(None),
            puts: Cell::new(0),
        }
    }

    /// Overwrite the stored value.
    #[inline]
    pub fn put(&self, value: T) {
        self.slot.set(Some(value));
        self.puts.set(self.puts.get().wrapping_add(1));
    }

    /// Latest value, or `None` if nothing has been put yet.
    #[inline]
    pub fn get(&self) -> Option<T> {
        self.slot.get()
    }

    /// Latest value, or `default` if nothing has been put yet.
    #[inline]
    pub fn get_or(&self, default: T) -> T {
        self.slot.get().unwrap_or(default)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of writes since creation.
    pub fn puts(&self) -> u32 {
        self.puts.get()
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// What a full [`Queue`] does with the next `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Overflow {
    /// Reject the incoming value; the queue is unchanged.
    DropNewest,
    /// Evict the head, then append the incoming value.
    DropOldest,
}

/// Queue access that cannot be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError {
    /// `get` on a queue with nothing in it. Check `any()` first.
    #[error("queue is empty")]
    Empty,
}

/// Bounded FIFO inter-task channel holding up to `N` values.
///
/// A zero capacity is rejected when the queue is built:
///
/// ```compile_fail
/// use quadloop::share::{Overflow, Queue};
/// let queue = Queue::<u8, 0>::new("nothing", Overflow::DropOldest);
/// ```
pub struct Queue<T, const N: usize> {
    name: &'static str,
    overflow: Overflow,
    items: RefCell<Deque<T, N>>,
    max_full: Cell<usize>,
    dropped: Cell<u32>,
}

impl<T, const N: usize> Queue<T, N> {
    const NON_ZERO_CAPACITY: () = assert!(N > 0, "queue capacity must be non-zero");

    /// Create an empty queue with the given overflow policy.
    pub const fn new(name: &'static str, overflow: Overflow) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_ZERO_CAPACITY;
        Self {
            name,
            overflow,
            items: RefCell::new(Deque::new()),
            max_full: Cell::new(0),
            dropped: Cell::new(0),
        }
    }

    /// Append a value, applying the overflow policy when full.
    ///
    /// Returns the value that did not make it into the queue, if any: the
    /// incoming value under [`Overflow::DropNewest`], or the evicted head under
    /// [`Overflow::DropOldest`].
    pub fn put(&self, value: T) -> Option<T> {
        let mut items = self.items.borrow_mut();

        let evicted = if items.is_full() {
            self.dropped.set(self.dropped.get().wrapping_add(1));
            match self.overflow {
                Overflow::DropNewest => return Some(value),
                Overflow::DropOldest => items.pop_front(),
            }
        } else {
            None
        };

        if let Err(rejected) = items.push_back(value) {
            return Some(rejected);
        }
        if items.len() > self.max_full.get() {
            self.max_full.set(items.len());
        }
        evicted
    }

    /// Remove and return the oldest value.
    pub fn get(&self) -> Result<T, QueueError> {
        self.items.borrow_mut().pop_front().ok_or(QueueError::Empty)
    }

    /// True if at least one value is waiting.
    #[inline]
    pub fn any(&self) -> bool {
        !self.is_empty()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Discard every queued value. Diagnostics are kept.
    pub fn clear(&self) {
        self.items.borrow_mut().clear();
    }

    pub fn overflow(&self) -> Overflow {
        self.overflow
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Highest occupancy seen since creation.
    pub fn max_full(&self) -> usize {
        self.max_full.get()
    }

    /// Number of values lost to overflow since creation.
    pub fn dropped(&self) -> u32 {
        self.dropped.get()
    }
}
