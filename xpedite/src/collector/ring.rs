//! Wait-free single-producer/single-consumer sample ring.
//!
//! The producer is the application thread that owns the buffer; the
//! consumer is the framework poll thread. Cursors are monotonically
//! increasing counters paired with release/acquire ordering; slot index is
//! cursor modulo capacity. On overflow the producer drops the sample and
//! counts it — it never blocks and never overwrites unread data.

use crate::probes::Sample;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub struct SampleRing {
    slots: Box<[UnsafeCell<Sample>]>,
    /// Next write position. Written by the producer only.
    head: AtomicUsize,
    /// Next read position. Written by the consumer only.
    tail: AtomicUsize,
    overflow_count: AtomicU64,
}

// SAFETY: head/tail ordering guarantees a slot is never read and written
// concurrently; the producer owns [tail, head) for writes only when there
// is free space, the consumer owns it for reads after the Release store of
// head.
unsafe impl Send for SampleRing {}
unsafe impl Sync for SampleRing {}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(Sample::new(0, 0, 0)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            overflow_count: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Producer side. Returns false when the ring is full; the sample is
    /// dropped and counted.
    #[inline]
    pub fn push(&self, sample: Sample) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) >= self.slots.len() {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        // SAFETY: the slot at head is outside [tail, head) so the consumer
        // will not read it until the Release store below publishes it.
        unsafe {
            *self.slots[head % self.slots.len()].get() = sample;
        }
        self.head.store(head.wrapping_add(1), Ordering::Release);
        true
    }

    /// Consumer side. Drains every published sample in production order.
    pub fn drain(&self, mut f: impl FnMut(Sample)) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let count = head.wrapping_sub(tail);
        let mut cursor = tail;
        while cursor != head {
            // SAFETY: [tail, head) was published by the producer's Release
            // store and is not rewritten until tail advances past it.
            let sample = unsafe { *self.slots[cursor % self.slots.len()].get() };
            f(sample);
            cursor = cursor.wrapping_add(1);
        }
        self.tail.store(head, Ordering::Release);
        count
    }

    /// Samples dropped since the last call. Consumed by the poll thread.
    pub fn take_overflow(&self) -> u64 {
        self.overflow_count.swap(0, Ordering::Relaxed)
    }
}
