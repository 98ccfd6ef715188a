//! Lock-free single-producer single-consumer byte queue.
//!
//! One side of each buffer lives in interrupt context and the other
//! in consumer context, so the queue must work through `&self` with
//! no locking: `head` is written only by the producer, `tail` only by
//! the consumer, and both are naturally-aligned atomic word stores.
//! One slot is kept empty to tell full from empty, so a buffer of
//! capacity `N` holds at most `N - 1` bytes.
//!
//! When the queue is full, [`RingBuffer::push`] drops the incoming
//! byte and returns `false`; it never overwrites queued data, because
//! reclaiming the oldest slot would mean writing the consumer-owned
//! `tail` index from the producer side. Callers that care keep an
//! overrun counter.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Fixed-capacity SPSC byte queue. `N` must be a power of two.
pub struct RingBuffer<const N: usize> {
    buf: UnsafeCell<[u8; N]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// Safety: single-producer/single-consumer discipline. `push` is only
// ever called from one context and `pop` from one other; each slot is
// written before `head` is released and read before `tail` is
// released, so the byte array is never accessed concurrently at the
// same index.
unsafe impl<const N: usize> Sync for RingBuffer<N> {}

impl<const N: usize> RingBuffer<N> {
    const CAPACITY_CHECK: () = assert!(N.is_power_of_two() && N >= 2, "capacity must be a power of two");

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::CAPACITY_CHECK;
        Self {
            buf: UnsafeCell::new([0; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Append one byte. Returns `false` (byte dropped) if the buffer
    /// is full.
    ///
    /// Producer side only.
    pub fn push(&self, byte: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) & (N - 1);
        if next == self.tail.load(Ordering::Acquire) {
            return false;
        }
        unsafe {
            (*self.buf.get())[head] = byte;
        }
        self.head.store(next, Ordering::Release);
        true
    }

    /// Remove and return the oldest byte, if any.
    ///
    /// Consumer side only.
    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let byte = unsafe { (*self.buf.get())[tail] };
        self.tail.store((tail + 1) & (N - 1), Ordering::Release);
        Some(byte)
    }

    /// Number of bytes waiting to be popped.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & (N - 1)
    }

    /// Number of bytes that can be pushed before the buffer is full.
    pub fn free_space(&self) -> usize {
        N - 1 - self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all contents.
    ///
    /// Only safe against concurrent use from the consumer side; the
    /// registry also uses it at open time, before any interrupt can
    /// touch the buffer.
    pub fn reset(&self) {
        self.tail.store(self.head.load(Ordering::Acquire), Ordering::Release);
    }
}
