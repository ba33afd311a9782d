//! Index-linked sequenced-cell segment, used by
//! [`crate::proxy::memory_bounded::MemoryBoundedProxy`].
//!
//! Identical fill/drain logic to [`super::sequenced::SequencedSegment`], but
//! `next` holds a [`VersionedIndex`] into the recycler's pool instead of a
//! raw pointer, since segments here live in a fixed arena and are referenced
//! by slot index, never individually heap-allocated or freed.

use super::{CacheAligned, Segment};
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_head_not_past_tail, debug_assert_initialized_read, debug_assert_monotonic,
};
use crate::versioned_index::VersionedIndex;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    seq: AtomicU64,
}

unsafe impl<T: Send> Sync for Slot<T> {}

/// `POOL` is the recycler pool size this segment's `next` field ranges
/// over (the same `N` used to instantiate [`VersionedIndex<POOL>`]).
pub struct IdxSequencedSegment<T, const POOL: usize> {
    start_index: CacheAligned<AtomicU64>,
    capacity: usize,
    tail: CacheAligned<AtomicU64>,
    head: CacheAligned<AtomicU64>,
    closed: CacheAligned<AtomicBool>,
    next: CacheAligned<AtomicU64>,
    slots: Box<[Slot<T>]>,
}

unsafe impl<T: Send, const POOL: usize> Send for IdxSequencedSegment<T, POOL> {}
unsafe impl<T: Send, const POOL: usize> Sync for IdxSequencedSegment<T, POOL> {}

impl<T, const POOL: usize> IdxSequencedSegment<T, POOL> {
    fn fresh_slots(capacity: usize) -> Box<[Slot<T>]> {
        (0..capacity)
            .map(|i| Slot {
                value: UnsafeCell::new(MaybeUninit::uninit()),
                seq: AtomicU64::new(i as u64),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice()
    }

    /// Loads the packed `next` pointer.
    #[inline]
    pub fn next_index(&self) -> VersionedIndex<POOL> {
        VersionedIndex::from_raw(self.next.load(Ordering::Acquire))
    }

    /// CAS `next` from `VersionedIndex::NULL` to `candidate`.
    #[inline]
    pub fn try_link_next(&self, candidate: VersionedIndex<POOL>) -> bool {
        self.next
            .compare_exchange(
                VersionedIndex::<POOL>::NULL.raw(),
                candidate.raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn is_drained(&self) -> bool {
        self.closed.load(Ordering::Acquire) && self.head.load(Ordering::Acquire) >= self.tail.load(Ordering::Acquire)
    }
}

impl<T, const POOL: usize> Segment<T> for IdxSequencedSegment<T, POOL> {
    fn new(start_index: u64, capacity: usize) -> Self {
        Self {
            start_index: CacheAligned::new(AtomicU64::new(start_index)),
            capacity,
            tail: CacheAligned::new(AtomicU64::new(0)),
            head: CacheAligned::new(AtomicU64::new(0)),
            closed: CacheAligned::new(AtomicBool::new(false)),
            next: CacheAligned::new(AtomicU64::new(VersionedIndex::<POOL>::NULL.raw())),
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
        self.closed.swap(true, Ordering::AcqRel);
    }

    fn open(&self, start_index: u64) {
        // Accepts both a drained-closed segment (the normal recycler-reuse
        // path) and a pristine never-filled one (a pool slot's first hand-out),
        // since both hold zero live items; only a segment still mid-fill must
        // be rejected.
        debug_assert!(
            self.head.load(Ordering::Acquire) >= self.tail.load(Ordering::Acquire),
            "open() called on a segment still holding live items"
        );
        self.start_index.store(start_index, Ordering::Release);
        self.tail.store(0, Ordering::Relaxed);
        self.head.store(0, Ordering::Relaxed);
        for (i, slot) in self.slots.iter().enumerate() {
            slot.seq.store(i as u64, Ordering::Relaxed);
        }
        self.next.store(VersionedIndex::<POOL>::NULL.raw(), Ordering::Relaxed);
        self.closed.store(false, Ordering::Release);
    }

    fn start_index(&self) -> u64 {
        self.start_index.load(Ordering::Acquire)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_index_starts_null() {
        let seg = IdxSequencedSegment::<u64, 8>::new(0, 4);
        assert!(seg.next_index().is_reserved());
    }

    #[test]
    fn link_next_then_reject_second_link() {
        let seg = IdxSequencedSegment::<u64, 8>::new(0, 4);
        let candidate = VersionedIndex::<8>::new(3, 1);
        assert!(seg.try_link_next(candidate));
        assert_eq!(seg.next_index(), candidate);
        assert!(!seg.try_link_next(VersionedIndex::<8>::new(5, 1)));
    }

    #[test]
    fn open_accepts_a_pristine_never_filled_segment() {
        // a pool slot handed out for the first time is never drained-closed,
        // but still holds zero live items; the recycler's reuse path must
        // be able to `open()` it just like a truly drained one.
        let seg = IdxSequencedSegment::<u64, 8>::new(0, 4);
        assert!(!seg.is_drained());
        seg.open(12);
        assert_eq!(seg.start_index(), 12);
        assert!(!seg.is_closed());
        assert!(seg.enqueue(1, false).is_ok());
    }

    #[test]
    fn fill_and_drain() {
        let seg = IdxSequencedSegment::<u64, 8>::new(0, 4);
        for v in 0..4u64 {
            assert!(seg.enqueue(v, false).is_ok());
        }
        assert_eq!(seg.enqueue(9, false), Err(9));
        let mut out = None;
        for expect in 0..4u64 {
            assert!(seg.dequeue(&mut out));
            assert_eq!(out, Some(expect));
        }
    }
}
