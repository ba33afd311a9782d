//! Epoch-recycler-protected proxy over an index-linked chain of segments
//! drawn from a fixed arena.
//!
//! Grounded on `BoundedMemProxy.hpp`'s `enqueue`/`dequeue`: identical shape to
//! [`super::hazard_linked::HazardProxy`]'s traversal, but `head`/`tail` are
//! packed [`VersionedIndex`] values into a fixed-size arena instead of raw
//! pointers, and a full/closed tail segment is replaced by reclaiming a slot
//! from [`crate::recycler::EpochRecycler`] rather than `Box`-allocating a new
//! one. Capacity is therefore bounded implicitly by the arena's size (`POOL`
//! segments, each holding `segment_capacity` items); there is no separate
//! counter or chunk check, the pool running dry *is* the bound.

use super::{ProxyError, ThreadMetadata};
use crate::backoff::Backoff;
use crate::config::Config;
use crate::invariants::debug_assert_versioned_match;
use crate::metrics::Metrics;
use crate::recycler::EpochRecycler;
use crate::segment::{CacheAligned, Segment};
use crate::segment::idx_sequenced::IdxSequencedSegment;
use crate::versioned_index::VersionedIndex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

struct ClosedHint {
    tail_raw: AtomicU64,
    closed: AtomicBool,
}

impl ClosedHint {
    fn new() -> Self {
        Self {
            tail_raw: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }
}

/// A FIFO queue built from a fixed arena of `POOL` index-linked segments,
/// each `segment_capacity` items wide, protected by an epoch recycler
/// instead of hazard pointers.
pub struct MemoryBoundedProxy<T, const POOL: usize> {
    arena: Box<[IdxSequencedSegment<T, POOL>]>,
    head: CacheAligned<AtomicU64>,
    tail: CacheAligned<AtomicU64>,
    tickets: crate::ticket::TicketAllocator,
    recycler: EpochRecycler,
    metadata: ThreadMetadata,
    closed_hints: Box<[ClosedHint]>,
    segment_capacity: usize,
    metrics: Option<Metrics>,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send, const POOL: usize> Send for MemoryBoundedProxy<T, POOL> {}
unsafe impl<T: Send, const POOL: usize> Sync for MemoryBoundedProxy<T, POOL> {}

impl<T, const POOL: usize> MemoryBoundedProxy<T, POOL> {
    /// Builds an empty proxy over a `POOL`-segment arena. `POOL` must be a
    /// nonzero power of two (the recycler's bucket-capacity requirement).
    pub fn new(segment_capacity: usize, max_threads: usize) -> Result<Self, ProxyError> {
        Self::new_inner(segment_capacity, max_threads, false)
    }

    /// Builds a proxy sized from `config`, enabling [`Metrics`] when
    /// `config.enable_metrics` is set.
    pub fn with_config(config: &Config) -> Result<Self, ProxyError> {
        Self::new_inner(config.segment_capacity(), config.max_threads, config.enable_metrics)
    }

    fn new_inner(segment_capacity: usize, max_threads: usize, enable_metrics: bool) -> Result<Self, ProxyError> {
        if segment_capacity == 0 {
            return Err(ProxyError::ZeroSegmentCapacity);
        }
        if max_threads == 0 {
            return Err(ProxyError::ZeroMaxThreads);
        }
        if POOL == 0 || !POOL.is_power_of_two() {
            return Err(ProxyError::InvalidPoolSize);
        }

        let arena: Box<[IdxSequencedSegment<T, POOL>]> = (0..POOL)
            .map(|_| IdxSequencedSegment::new(0, segment_capacity))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let recycler = EpochRecycler::new(POOL, max_threads);

        // reclaim the sentinel out of the freshly-seeded free bucket; this
        // runs before any real thread has acquired a ticket, so using ticket
        // 0 here is just a construction-time borrow of its epoch cell.
        let sentinel_idx = recycler
            .reclaim(0)
            .expect("a freshly constructed recycler pool always has a free slot");
        let sentinel = VersionedIndex::<POOL>::new(sentinel_idx, 0);

        Ok(Self {
            arena,
            head: CacheAligned::new(AtomicU64::new(sentinel.raw())),
            tail: CacheAligned::new(AtomicU64::new(sentinel.raw())),
            tickets: crate::ticket::TicketAllocator::new(max_threads),
            recycler,
            metadata: ThreadMetadata::new(max_threads),
            closed_hints: (0..max_threads).map(|_| ClosedHint::new()).collect(),
            segment_capacity,
            metrics: enable_metrics.then(Metrics::new),
            _marker: PhantomData,
        })
    }

    /// Acquires a ticket for the calling thread.
    pub fn acquire(&self) -> Option<usize> {
        let mut ticket = 0;
        if self.tickets.acquire(&mut ticket) {
            Some(ticket)
        } else {
            None
        }
    }

    /// Releases the calling thread's ticket.
    pub fn release(&self) {
        self.tickets.release();
    }

    pub fn segment_capacity(&self) -> usize {
        self.segment_capacity
    }

    /// Total item capacity: the arena can never hold more than `POOL`
    /// segments' worth of items at once.
    pub fn capacity(&self) -> usize {
        POOL * self.segment_capacity
    }

    /// Approximate item count (see [`super::hazard_linked::HazardProxy::size`]
    /// for why this is a best-effort sum rather than an exact count).
    pub fn size(&self) -> usize {
        self.metadata.approximate_total().max(0) as usize
    }

    /// Current metrics snapshot, or `None` if built without `enable_metrics`.
    pub fn metrics(&self) -> Option<crate::metrics::MetricsSnapshot> {
        self.metrics.as_ref().map(Metrics::snapshot)
    }

    fn closed_hint(&self, ticket: usize, tail_raw: u64) -> bool {
        let cell = &self.closed_hints[ticket];
        if cell.tail_raw.load(Ordering::Relaxed) == tail_raw {
            cell.closed.load(Ordering::Relaxed)
        } else {
            false
        }
    }

    fn mark_closed_hint(&self, ticket: usize, tail_raw: u64) {
        let cell = &self.closed_hints[ticket];
        cell.tail_raw.store(tail_raw, Ordering::Relaxed);
        cell.closed.store(true, Ordering::Relaxed);
    }

    /// Attempts to enqueue `value`. Returns `false` if the arena's pool of
    /// `POOL` segments is exhausted and the epoch cannot be advanced to free
    /// one up (the memory-bounded capacity policy saturating).
    pub fn enqueue(&self, ticket: usize, value: T) -> bool {
        let mut value = value;
        let mut backoff = Backoff::new();
        loop {
            let tail_raw = self.recycler.protect_epoch_and_load(ticket, &self.tail);
            let tail_vi = VersionedIndex::<POOL>::from_raw(tail_raw);
            let tail_ref = &self.arena[tail_vi.index()];

            let next_vi = tail_ref.next_index();
            if !next_vi.is_reserved() {
                let _ = self
                    .tail
                    .compare_exchange(tail_raw, next_vi.raw(), Ordering::AcqRel, Ordering::Acquire);
                continue;
            }

            let hint = self.closed_hint(ticket, tail_raw);
            match tail_ref.enqueue(value, hint) {
                Ok(()) => {
                    self.metadata.record_enqueue(ticket);
                    if let Some(m) = &self.metrics {
                        m.add_enqueued(1);
                    }
                    self.recycler.clear_epoch(ticket);
                    return true;
                }
                Err(v) => value = v,
            }
            self.mark_closed_hint(ticket, tail_raw);

            let Some(new_idx) = self.recycler.reclaim(ticket) else {
                if let Some(m) = &self.metrics {
                    m.add_reclaim_retries(1);
                }
                if backoff.is_completed() {
                    self.recycler.clear_epoch(ticket);
                    return false;
                }
                self.recycler.clear_epoch(ticket);
                backoff.snooze();
                continue;
            };
            backoff.reset();

            let new_start = tail_ref.start_index() + tail_ref.capacity() as u64;
            let new_seg = &self.arena[new_idx];
            new_seg.open(new_start);
            new_seg
                .enqueue(value, false)
                .ok()
                .expect("a freshly opened segment always accepts its first item");

            let candidate = VersionedIndex::<POOL>::new(new_idx, tail_vi.version().wrapping_add(1));
            if tail_ref.try_link_next(candidate) {
                if let Ok(prev) = self
                    .tail
                    .compare_exchange(tail_raw, candidate.raw(), Ordering::AcqRel, Ordering::Acquire)
                {
                    debug_assert_versioned_match!(tail_raw, prev);
                }
                self.metadata.record_enqueue(ticket);
                if let Some(m) = &self.metrics {
                    m.add_enqueued(1);
                    m.add_segments_linked(1);
                }
                self.recycler.clear_epoch(ticket);
                return true;
            }

            // lost the race to link; reclaim the value back out of the slot
            // we pre-filled, then return that whole slot to the pool before
            // retrying against whatever segment actually got linked.
            let mut reclaimed = None;
            new_seg.dequeue(&mut reclaimed);
            value = reclaimed.expect("segment we just pre-filled must still hold that one item");
            self.recycler.retire(new_idx, ticket);
        }
    }

    /// Attempts to dequeue one value. Returns `None` if the queue is
    /// currently empty.
    pub fn dequeue(&self, ticket: usize) -> Option<T> {
        loop {
            let head_raw = self.recycler.protect_epoch_and_load(ticket, &self.head);
            let head_vi = VersionedIndex::<POOL>::from_raw(head_raw);
            let head_ref = &self.arena[head_vi.index()];

            let mut out = None;
            if head_ref.dequeue(&mut out) {
                self.record_dequeue_success(ticket);
                self.recycler.clear_epoch(ticket);
                return out;
            }

            let next_vi = head_ref.next_index();
            if next_vi.is_reserved() {
                self.recycler.clear_epoch(ticket);
                return None;
            }

            // straggler tolerance: a producer may still be mid-publish on
            // this segment even though `next` is already linked.
            if head_ref.dequeue(&mut out) {
                self.record_dequeue_success(ticket);
                self.recycler.clear_epoch(ticket);
                return out;
            }

            if self
                .head
                .compare_exchange(head_raw, next_vi.raw(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if let Some(m) = &self.metrics {
                    m.add_segments_retired(1);
                }
                self.recycler.retire(head_vi.index(), ticket);
            }
        }
    }

    fn record_dequeue_success(&self, ticket: usize) {
        self.metadata.record_dequeue(ticket);
        if let Some(m) = &self.metrics {
            m.add_dequeued(1);
        }
    }
}

impl<T, const POOL: usize> Drop for MemoryBoundedProxy<T, POOL> {
    fn drop(&mut self) {
        // every arena slot is owned outright by this proxy regardless of
        // whether it is currently linked, free, or awaiting an epoch
        // advance, so draining the whole arena (instead of following `next`
        // from `head`) is what actually reaches every live item.
        for seg in self.arena.iter() {
            let mut out = None;
            while seg.dequeue(&mut out) {
                out = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_proxy() -> MemoryBoundedProxy<u64, 4> {
        MemoryBoundedProxy::new(4, 8).unwrap()
    }

    #[test]
    fn fifo_across_a_single_segment() {
        let proxy = new_proxy();
        let t = proxy.acquire().unwrap();
        for v in 0..4u64 {
            assert!(proxy.enqueue(t, v));
        }
        for expect in 0..4u64 {
            assert_eq!(proxy.dequeue(t), Some(expect));
        }
        assert_eq!(proxy.dequeue(t), None);
    }

    #[test]
    fn enqueue_links_a_new_segment_past_capacity() {
        let proxy = new_proxy();
        let t = proxy.acquire().unwrap();
        for v in 0..10u64 {
            assert!(proxy.enqueue(t, v));
        }
        for expect in 0..10u64 {
            assert_eq!(proxy.dequeue(t), Some(expect));
        }
        assert_eq!(proxy.dequeue(t), None);
    }

    #[test]
    fn pool_exhaustion_rejects_enqueue() {
        // 4 segments of 4 items, pool of 4: once every slot is linked and
        // full, the arena has nothing left to reclaim.
        let proxy: MemoryBoundedProxy<u64, 4> = MemoryBoundedProxy::new(4, 4).unwrap();
        let t = proxy.acquire().unwrap();
        for v in 0..16u64 {
            assert!(proxy.enqueue(t, v));
        }
        assert!(!proxy.enqueue(t, 999));
    }

    #[test]
    fn draining_frees_a_pool_slot_for_reuse() {
        let proxy: MemoryBoundedProxy<u64, 4> = MemoryBoundedProxy::new(2, 4).unwrap();
        let t = proxy.acquire().unwrap();
        for v in 0..8u64 {
            assert!(proxy.enqueue(t, v));
        }
        assert!(!proxy.enqueue(t, 999));

        for expect in 0..2u64 {
            assert_eq!(proxy.dequeue(t), Some(expect));
        }

        // the drained-and-retired first segment is now back in the pool.
        assert!(proxy.enqueue(t, 100));
    }

    #[test]
    fn concurrent_producers_and_consumers_conserve_every_item() {
        use std::sync::Arc;
        use std::thread;

        let proxy = Arc::new(MemoryBoundedProxy::<u64, 16>::new(8, 16).unwrap());
        const PER_PRODUCER: u64 = 2000;

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let proxy = Arc::clone(&proxy);
                thread::spawn(move || {
                    let t = proxy.acquire().unwrap();
                    for i in 0..PER_PRODUCER {
                        assert!(proxy.enqueue(t, p * PER_PRODUCER + i));
                    }
                    proxy.release();
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut seen = Vec::new();
        let t = proxy.acquire().unwrap();
        while let Some(v) = proxy.dequeue(t) {
            seen.push(v);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..4 * PER_PRODUCER).collect::<Vec<_>>());
    }
}
