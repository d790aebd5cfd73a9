//! Fixed-capacity byte queue between DMA completions and user I/O.
//!
//! `StreamQueue` stores up to `capacity` bytes in a single heap allocation
//! made at device open. It is a single-producer / single-consumer (SPSC)
//! structure: for the RX queue the completion handler produces and readers
//! consume, for the TX queue writers produce and the completion handler
//! consumes.
//!
//! # Constraints
//!
//! - `push` and `pop` never block and never allocate; both are partial:
//!   they move `min(requested, room)` bytes and report the count.
//! - Not interrupt-safe by itself. The engine shares each queue through a
//!   [`SharedQueue`]: a critical-section mutex held for exactly one queue
//!   operation, never across an await. User-side serialization lives in the
//!   device's read and write locks, so the completion context never finds a
//!   queue held by a sleeping caller.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;

/// A fixed-capacity circular byte queue.
pub struct StreamQueue {
    buf: Box<[u8]>,
    /// Index of the next byte to read.
    read: usize,
    /// Index of the next byte to write.
    write: usize,
    /// Number of valid bytes currently held.
    count: usize,
}

impl StreamQueue {
    /// Allocate an empty queue of `capacity` bytes.
    ///
    /// Returns `None` if the allocation cannot be satisfied.
    pub fn with_capacity(capacity: usize) -> Option<Self> {
        let mut storage = Vec::new();
        storage.try_reserve_exact(capacity).ok()?;
        storage.resize(capacity, 0u8);
        Some(Self {
            buf: storage.into_boxed_slice(),
            read: 0,
            write: 0,
            count: 0,
        })
    }

    /// Append up to `data.len()` bytes; returns how many were accepted.
    #[allow(clippy::arithmetic_side_effects)] // Safety: n <= space; cursors wrap via % capacity
    #[allow(clippy::indexing_slicing)] // Safety: spans computed from write < capacity and n <= space
    pub fn push(&mut self, data: &[u8]) -> usize {
        let cap = self.buf.len();
        let n = data.len().min(self.available_space());
        if n == 0 {
            return 0;
        }
        let first = n.min(cap - self.write);
        self.buf[self.write..self.write + first].copy_from_slice(&data[..first]);
        self.buf[..n - first].copy_from_slice(&data[first..n]);
        self.write = (self.write + n) % cap;
        self.count += n;
        n
    }

    /// Move up to `out.len()` bytes into `out`; returns how many were moved.
    #[allow(clippy::arithmetic_side_effects)] // Safety: n <= count; cursors wrap via % capacity
    #[allow(clippy::indexing_slicing)] // Safety: spans computed from read < capacity and n <= count
    pub fn pop(&mut self, out: &mut [u8]) -> usize {
        let cap = self.buf.len();
        let n = out.len().min(self.count);
        if n == 0 {
            return 0;
        }
        let first = n.min(cap - self.read);
        out[..first].copy_from_slice(&self.buf[self.read..self.read + first]);
        out[first..n].copy_from_slice(&self.buf[..n - first]);
        self.read = (self.read + n) % cap;
        self.count -= n;
        n
    }

    /// Bytes that can be pushed before the queue is full.
    #[allow(clippy::arithmetic_side_effects)] // Safety: count <= capacity invariant
    pub fn available_space(&self) -> usize {
        self.buf.len() - self.count
    }

    /// Bytes waiting to be popped.
    pub fn available_data(&self) -> usize {
        self.count
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// `true` when no bytes are held.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// `true` when no byte can be pushed.
    pub fn is_full(&self) -> bool {
        self.count == self.buf.len()
    }

    /// Drop all content and rewind both cursors.
    pub fn reset(&mut self) {
        self.read = 0;
        self.write = 0;
        self.count = 0;
    }

    /// Drop all unread content by advancing the read cursor to the write
    /// cursor. Only touches consumer-side state.
    pub fn discard_pending(&mut self) {
        self.read = self.write;
        self.count = 0;
    }
}

impl core::fmt::Debug for StreamQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamQueue")
            .field("capacity", &self.capacity())
            .field("count", &self.count)
            .field("read", &self.read)
            .field("write", &self.write)
            .finish()
    }
}

/// A [`StreamQueue`] shared between user calls and the completion context.
pub(crate) struct SharedQueue(BlockingMutex<CriticalSectionRawMutex, RefCell<StreamQueue>>);

impl SharedQueue {
    pub(crate) fn new(queue: StreamQueue) -> Self {
        Self(BlockingMutex::new(RefCell::new(queue)))
    }

    /// Run `f` on the queue inside one critical section.
    ///
    /// `None` only when called re-entrantly from inside another access on
    /// the same context.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut StreamQueue) -> R) -> Option<R> {
        self.0
            .lock(|cell| cell.try_borrow_mut().ok().map(|mut q| f(&mut *q)))
    }

    #[cfg(test)]
    pub(crate) fn get_mut(&mut self) -> &mut StreamQueue {
        self.0.get_mut().get_mut()
    }
}
