//! Hazard-pointer-protected proxy over a chain of pointer-linked segments.
//!
//! Grounded on `UnboundedProxy.hpp`'s `enqueue`/`dequeue`: a producer
//! protects the tail, helps advance it past any already-linked next segment,
//! attempts a segment-local enqueue, and on failure allocates and links a
//! fresh segment pre-loaded with the value it couldn't place. A consumer
//! protects the head, attempts a segment-local dequeue, retries once on the
//! same head before treating it as drained, then CASes the head forward and
//! retires the old one. [`CapacityPolicy`] folds `BoundedChunkProxy.hpp`'s
//! segment-count bound and `BoundedCounterProxy.hpp`'s item-count bound into
//! the same struct, since the hazard-pointer traversal is identical across
//! all three (only the admission check before allocating a new segment
//! differs).

use super::{CapacityPolicy, ProxyError, ThreadMetadata};
use crate::config::Config;
use crate::hazard::HazardArray;
use crate::invariants::debug_assert_valid_ring_ptr;
use crate::metrics::Metrics;
use crate::segment::{CacheAligned, PointerLinked};
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicPtr, AtomicUsize, Ordering};

struct ClosedHint {
    addr: AtomicUsize,
    closed: AtomicBool,
}

impl ClosedHint {
    fn new() -> Self {
        Self {
            addr: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }
}

/// A FIFO queue built from a pointer-linked chain of fixed-capacity
/// segments, protected by hazard pointers instead of epoch reclamation.
pub struct HazardProxy<T, S: PointerLinked<T>> {
    head: CacheAligned<AtomicPtr<S>>,
    tail: CacheAligned<AtomicPtr<S>>,
    tickets: crate::ticket::TicketAllocator,
    hazard: HazardArray<S>,
    metadata: ThreadMetadata,
    closed_hints: Box<[ClosedHint]>,
    segment_capacity: usize,
    policy: CapacityPolicy,
    linked_segments: AtomicUsize,
    counter: AtomicI64,
    metrics: Option<Metrics>,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send, S: PointerLinked<T> + Send + Sync> Send for HazardProxy<T, S> {}
unsafe impl<T: Send, S: PointerLinked<T> + Send + Sync> Sync for HazardProxy<T, S> {}

impl<T, S: PointerLinked<T>> HazardProxy<T, S> {
    /// Builds an empty proxy with a single sentinel segment already linked.
    pub fn new(segment_capacity: usize, max_threads: usize, policy: CapacityPolicy) -> Result<Self, ProxyError> {
        Self::new_inner(segment_capacity, max_threads, policy, false)
    }

    /// Builds a proxy sized from `config` (segment capacity and thread cap),
    /// enabling per-ticket [`Metrics`] when `config.enable_metrics` is set.
    pub fn with_config(config: &Config, policy: CapacityPolicy) -> Result<Self, ProxyError> {
        Self::new_inner(
            config.segment_capacity(),
            config.max_threads,
            policy,
            config.enable_metrics,
        )
    }

    /// Current metrics snapshot, or `None` if this proxy was built without
    /// `enable_metrics`.
    pub fn metrics(&self) -> Option<crate::metrics::MetricsSnapshot> {
        self.metrics.as_ref().map(Metrics::snapshot)
    }

    fn new_inner(
        segment_capacity: usize,
        max_threads: usize,
        policy: CapacityPolicy,
        enable_metrics: bool,
    ) -> Result<Self, ProxyError> {
        if segment_capacity == 0 {
            return Err(ProxyError::ZeroSegmentCapacity);
        }
        if max_threads == 0 {
            return Err(ProxyError::ZeroMaxThreads);
        }
        match policy {
            CapacityPolicy::ChunkBound(0) => return Err(ProxyError::ZeroChunkBound),
            CapacityPolicy::CounterBound(0) => return Err(ProxyError::ZeroCounterBound),
            _ => {}
        }

        let sentinel = Box::into_raw(Box::new(S::new(0, segment_capacity)));
        Ok(Self {
            head: CacheAligned::new(AtomicPtr::new(sentinel)),
            tail: CacheAligned::new(AtomicPtr::new(sentinel)),
            tickets: crate::ticket::TicketAllocator::new(max_threads),
            hazard: HazardArray::new(max_threads),
            metadata: ThreadMetadata::new(max_threads),
            closed_hints: (0..max_threads).map(|_| ClosedHint::new()).collect(),
            segment_capacity,
            policy,
            linked_segments: AtomicUsize::new(1),
            counter: AtomicI64::new(0),
            metrics: enable_metrics.then(Metrics::new),
            _marker: PhantomData,
        })
    }

    /// Acquires a ticket for the calling thread. Every call into this
    /// proxy's `enqueue`/`dequeue` needs one.
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

    /// Total item capacity, or `None` if unbounded.
    pub fn capacity(&self) -> Option<usize> {
        match self.policy {
            CapacityPolicy::Unbounded => None,
            CapacityPolicy::ChunkBound(max_segments) => Some(max_segments * self.segment_capacity),
            CapacityPolicy::CounterBound(cap) => Some(cap),
        }
    }

    /// Approximate item count. Exact (a live reservation counter) under
    /// [`CapacityPolicy::CounterBound`]; a best-effort sum of per-ticket
    /// enqueue/dequeue deltas otherwise, since an exact cross-segment count
    /// would need to freeze every producer and consumer to take.
    pub fn size(&self) -> usize {
        match self.policy {
            CapacityPolicy::CounterBound(_) => self.counter.load(Ordering::Acquire).max(0) as usize,
            _ => self.metadata.approximate_total().max(0) as usize,
        }
    }

    fn closed_hint(&self, ticket: usize, tail: *mut S) -> bool {
        let cell = &self.closed_hints[ticket];
        if cell.addr.load(Ordering::Relaxed) == tail as usize {
            cell.closed.load(Ordering::Relaxed)
        } else {
            false
        }
    }

    fn mark_closed_hint(&self, ticket: usize, tail: *mut S) {
        let cell = &self.closed_hints[ticket];
        cell.addr.store(tail as usize, Ordering::Relaxed);
        cell.closed.store(true, Ordering::Relaxed);
    }

    /// Attempts to enqueue `value`. Returns `false` if the bound this
    /// proxy was constructed with is already saturated.
    pub fn enqueue(&self, ticket: usize, value: T) -> bool {
        if let CapacityPolicy::CounterBound(cap) = self.policy {
            let reserved = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
            if reserved as usize > cap {
                self.counter.fetch_sub(1, Ordering::AcqRel);
                return false;
            }
        }

        let mut value = value;
        let mut tail = self.hazard.protect(&self.tail, ticket);
        loop {
            let tail2 = self.tail.load(Ordering::Acquire);
            if !ptr::eq(tail, tail2) {
                tail = self.hazard.protect(&self.tail, ticket);
                continue;
            }
            debug_assert_valid_ring_ptr!(tail);
            let tail_ref = unsafe { &*tail };

            let next = tail_ref.next_ptr();
            if !next.is_null() {
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::AcqRel, Ordering::Acquire);
                tail = self.hazard.protect(&self.tail, ticket);
                continue;
            }

            let hint = self.closed_hint(ticket, tail);
            match tail_ref.enqueue(value, hint) {
                Ok(()) => {
                    self.metadata.record_enqueue(ticket);
                    if let Some(m) = &self.metrics {
                        m.add_enqueued(1);
                    }
                    self.hazard.clear(ticket);
                    return true;
                }
                Err(v) => value = v,
            }
            self.mark_closed_hint(ticket, tail);

            if let CapacityPolicy::ChunkBound(max_segments) = self.policy {
                if self.linked_segments.load(Ordering::Relaxed) >= max_segments {
                    self.hazard.clear(ticket);
                    return false;
                }
            }

            let new_tail = Box::into_raw(Box::new(S::new(
                tail_ref.start_index() + tail_ref.capacity() as u64,
                self.segment_capacity,
            )));
            unsafe {
                (*new_tail)
                    .enqueue(value, false)
                    .ok()
                    .expect("a freshly allocated segment always accepts its first item");
            }

            if tail_ref.try_link_next(new_tail) {
                self.linked_segments.fetch_add(1, Ordering::AcqRel);
                let _ = self
                    .tail
                    .compare_exchange(tail, new_tail, Ordering::AcqRel, Ordering::Acquire);
                self.metadata.record_enqueue(ticket);
                if let Some(m) = &self.metrics {
                    m.add_enqueued(1);
                    m.add_segments_linked(1);
                }
                self.hazard.clear(ticket);
                return true;
            }

            // another producer linked first; reclaim our value out of the
            // segment we lost the race to plant it in, then retry against
            // whichever segment actually got linked.
            let mut reclaimed = None;
            unsafe { &*new_tail }.dequeue(&mut reclaimed);
            value = reclaimed.expect("segment we just pre-filled must still hold that one item");
            unsafe {
                drop(Box::from_raw(new_tail));
            }
            tail = self.hazard.protect(&self.tail, ticket);
        }
    }

    /// Attempts to dequeue one value. Returns `None` if the queue is
    /// currently empty.
    pub fn dequeue(&self, ticket: usize) -> Option<T> {
        let mut head = self.hazard.protect(&self.head, ticket);
        loop {
            let head2 = self.head.load(Ordering::Acquire);
            if !ptr::eq(head, head2) {
                head = self.hazard.protect(&self.head, ticket);
                continue;
            }
            debug_assert_valid_ring_ptr!(head);
            let head_ref = unsafe { &*head };

            let mut out = None;
            if head_ref.dequeue(&mut out) {
                self.record_dequeue_success(ticket);
                self.hazard.clear(ticket);
                return out;
            }

            let next = head_ref.next_ptr();
            if next.is_null() {
                self.hazard.clear(ticket);
                return None;
            }

            // straggler tolerance: a producer may still be mid-publish on
            // this segment even though `next` is already linked, so try
            // once more before giving up on it.
            if head_ref.dequeue(&mut out) {
                self.record_dequeue_success(ticket);
                self.hazard.clear(ticket);
                return out;
            }

            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if let CapacityPolicy::ChunkBound(_) = self.policy {
                    self.linked_segments.fetch_sub(1, Ordering::AcqRel);
                }
                if let Some(m) = &self.metrics {
                    m.add_segments_retired(1);
                }
                unsafe {
                    self.hazard.retire(head, ticket);
                }
            }
            head = self.hazard.protect(&self.head, ticket);
        }
    }

    fn record_dequeue_success(&self, ticket: usize) {
        self.metadata.record_dequeue(ticket);
        if let CapacityPolicy::CounterBound(_) = self.policy {
            self.counter.fetch_sub(1, Ordering::AcqRel);
        }
        if let Some(m) = &self.metrics {
            m.add_dequeued(1);
        }
    }
}

impl<T, S: PointerLinked<T>> Drop for HazardProxy<T, S> {
    fn drop(&mut self) {
        let mut cur = self.head.load(Ordering::Relaxed);
        while !cur.is_null() {
            let seg = unsafe { &*cur };
            let mut out = None;
            while seg.dequeue(&mut out) {
                out = None;
            }
            let next = seg.next_ptr();
            unsafe {
                drop(Box::from_raw(cur));
            }
            cur = next;
        }
    }
}
