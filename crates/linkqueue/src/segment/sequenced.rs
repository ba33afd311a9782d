//! Sequenced-cell segment: a bounded single-fill ring where each slot
//! carries a value plus a sequence number, decoupling "a producer has
//! claimed this slot" from "the value is visible to a consumer".
//!
//! Grounded on the classic bounded MPMC ring (the sequence-number handoff
//! Vyukov popularized, and the same `(value, seq)` shape the PRQ/CAS-loop
//! variant in the original design uses) and on this crate's own `Ring<T>`
//! for the cache-alignment and `MaybeUninit` slot idiom.
//!
//! Unlike a general-purpose ring, a segment is filled exactly once between
//! `open()` calls: `tail` never wraps past `capacity` while open, so the
//! "stale slot" branch of the classic algorithm never triggers here. It is
//! the recycler's `open()` that resets a segment for its next fill, not
//! index wraparound.

use super::{CacheAligned, PointerLinked, Segment};
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_head_not_past_tail, debug_assert_initialized_read, debug_assert_monotonic,
};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    seq: AtomicU64,
}

unsafe impl<T: Send> Sync for Slot<T> {}

/// Pointer-linked sequenced-cell segment, used by [`crate::proxy::hazard_linked::HazardProxy`].
pub struct SequencedSegment<T> {
    start_index: CacheAligned<AtomicU64>,
    capacity: usize,
    tail: CacheAligned<AtomicU64>,
    head: CacheAligned<AtomicU64>,
    closed: CacheAligned<AtomicBool>,
    next: CacheAligned<AtomicPtr<SequencedSegment<T>>>,
    slots: Box<[Slot<T>]>,
}

unsafe impl<T: Send> Send for SequencedSegment<T> {}
unsafe impl<T: Send> Sync for SequencedSegment<T> {}

impl<T> SequencedSegment<T> {
    fn fresh_slots(capacity: usize) -> Box<[Slot<T>]> {
        (0..capacity)
            .map(|i| Slot {
                value: UnsafeCell::new(MaybeUninit::uninit()),
                seq: AtomicU64::new(i as u64),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice()
    }

    /// True once every slot that was ever claimed has also been drained.
    pub fn is_drained(&self) -> bool {
        self.closed.load(Ordering::Acquire) && self.head.load(Ordering::Acquire) >= self.tail.load(Ordering::Acquire)
    }
}

impl<T> PointerLinked<T> for SequencedSegment<T> {
    #[inline]
    fn next_ptr(&self) -> *mut Self {
        self.next.load(Ordering::Acquire)
    }

    #[inline]
    fn try_link_next(&self, candidate: *mut Self) -> bool {
        self.next
            .compare_exchange(ptr::null_mut(), candidate, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<T> Segment<T> for SequencedSegment<T> {
    fn new(start_index: u64, capacity: usize) -> Self {
        Self {
            start_index: CacheAligned::new(AtomicU64::new(start_index)),
            capacity,
            tail: CacheAligned::new(AtomicU64::new(0)),
            head: CacheAligned::new(AtomicU64::new(0)),
            closed: CacheAligned::new(AtomicBool::new(false)),
            next: CacheAligned::new(AtomicPtr::new(ptr::null_mut())),
            slots: Self::fresh_slots(capacity),
        }
    }

    fn enqueue(&self, value: T, closed_hint: bool) -> Result<(), T> {
        if closed_hint || self.closed.load(Ordering::Acquire) {
            return Err(value);
        }
        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            if tail as usize >= self.capacity {
                self.close();
                return Err(value);
            }
            let idx = tail as usize % self.capacity;
            let seq = self.slots[idx].seq.load(Ordering::Acquire);
            if seq != tail {
                // another producer is mid-CAS on this tail value; re-read.
                continue;
            }
            if self
                .tail
                .compare_exchange_weak(tail, tail + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                debug_assert_monotonic!("tail", tail, tail + 1);
                debug_assert_bounded_count!(
                    (tail + 1).saturating_sub(self.head.load(Ordering::Relaxed)),
                    self.capacity as u64
                );
                unsafe {
                    (*self.slots[idx].value.get()).write(value);
                }
                self.slots[idx].seq.store(tail + 1, Ordering::Release);
                return Ok(());
            }
        }
    }

    fn dequeue(&self, out: &mut Option<T>) -> bool {
        loop {
            let head = self.head.load(Ordering::Relaxed);
            if head as usize >= self.capacity {
                return false;
            }
            let idx = head as usize % self.capacity;
            let seq = self.slots[idx].seq.load(Ordering::Acquire);
            if seq != head + 1 {
                // value not yet published by its producer (or none claimed it).
                return false;
            }
            if self
                .head
                .compare_exchange_weak(head, head + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                debug_assert_monotonic!("head", head, head + 1);
                debug_assert_initialized_read!(head, head, self.tail.load(Ordering::Relaxed));
                debug_assert_head_not_past_tail!(head + 1, self.tail.load(Ordering::Relaxed));
                let value = unsafe { (*self.slots[idx].value.get()).assume_init_read() };
                *out = Some(value);
                return true;
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        // idempotent: racing producers may all observe overflow and call
        // this concurrently, so a prior `true` here is expected, not a bug.
        self.closed.swap(true, Ordering::AcqRel);
    }

    fn open(&self, start_index: u64) {
        debug_assert!(self.is_drained(), "open() called on a segment still holding live items");
        self.start_index.store(start_index, Ordering::Release);
        self.tail.store(0, Ordering::Relaxed);
        self.head.store(0, Ordering::Relaxed);
        for (i, slot) in self.slots.iter().enumerate() {
            slot.seq.store(i as u64, Ordering::Relaxed);
        }
        self.next.store(ptr::null_mut(), Ordering::Relaxed);
        self.closed.store(false, Ordering::Release);
    }

    fn start_index(&self) -> u64 {
        self.start_index.load(Ordering::Acquire)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
