//! Bounded MPMC ring of pool indices, the rotating-bucket building block for
//! [`crate::recycler::EpochRecycler`].
//!
//! Unlike a segment (filled once, then closed), a bucket is reused
//! indefinitely: indices cycle in and out as the epoch rotates. This is the
//! classic sequence-number-per-slot bounded MPMC ring, chosen over porting
//! the original's external `LFring`/SCQ wrapper. The exact bucket
//! implementation is an implementation detail as long as it upholds the
//! recycler's phased-MPMC contract, and this crate does not bundle the
//! external SCQ library.

struct Slot {
    value: std::sync::atomic::AtomicUsize,
    seq: std::sync::atomic::AtomicUsize,
}

/// Fixed-capacity MPMC queue of `usize` (pool indices).
pub struct IndexBucket {
    capacity: usize,
    mask: usize,
    enqueue_pos: std::sync::atomic::AtomicUsize,
    dequeue_pos: std::sync::atomic::AtomicUsize,
    slots: Box<[Slot]>,
}

use std::sync::atomic::{AtomicUsize, Ordering};

impl IndexBucket {
    /// `capacity` must be a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "IndexBucket capacity must be a power of two");
        let slots = (0..capacity)
            .map(|i| Slot {
                value: AtomicUsize::new(0),
                seq: AtomicUsize::new(i),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            capacity,
            mask: capacity - 1,
            enqueue_pos: AtomicUsize::new(0),
            dequeue_pos: AtomicUsize::new(0),
            slots,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn enqueue(&self, value: usize) -> bool {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as isize - pos as isize;
            if diff == 0 {
                if self
                    .enqueue_pos
                    .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    slot.value.store(value, Ordering::Relaxed);
                    slot.seq.store(pos + 1, Ordering::Release);
                    return true;
                }
            } else if diff < 0 {
                return false; // full
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    pub fn dequeue(&self, out: &mut usize) -> bool {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as isize - (pos + 1) as isize;
            if diff == 0 {
                if self
                    .dequeue_pos
                    .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    *out = slot.value.load(Ordering::Relaxed);
                    slot.seq.store(pos + self.capacity, Ordering::Release);
                    return true;
                }
            } else if diff < 0 {
                return false; // empty
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }
}
