//! Proxies link segments into a larger queue: a pointer-linked chain guarded
//! by hazard pointers ([`hazard_linked`]), or an index-linked chain backed by
//! [`crate::recycler::EpochRecycler`] ([`memory_bounded`]).
//!
//! Both share the same capacity-policy vocabulary and the same per-ticket
//! bookkeeping for an approximate [`size`](hazard_linked::HazardProxy::size):
//! exact counts would need a cross-segment scan under contention, so instead
//! every ticket keeps a signed running delta of its own enqueue/dequeue
//! calls, and `size()` sums them. Grounded on `BoundedChunkProxy.hpp`'s and
//! `BoundedMemProxy.hpp`'s `size_` accounting, which takes the same shortcut.

pub mod hazard_linked;
pub mod memory_bounded;

use thiserror::Error;

/// How a proxy bounds the total number of items it can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapacityPolicy {
    /// No bound beyond available memory; a full segment always gets a new
    /// one linked after it.
    Unbounded,
    /// At most this many segments may be linked at once; once that many are
    /// live, a full tail segment causes `enqueue` to fail instead of
    /// allocating another.
    ChunkBound(usize),
    /// At most this many items total across all linked segments.
    CounterBound(usize),
}

/// Construction-time errors a proxy can report.
///
/// Per-call failures (full, empty, ticket pool exhausted) are reported as
/// plain `bool`s on the hot path; this type is reserved for misconfiguration
/// caught once, at construction.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("segment capacity must be nonzero")]
    ZeroSegmentCapacity,
    #[error("chunk bound must allow at least one segment")]
    ZeroChunkBound,
    #[error("counter bound must allow at least one item")]
    ZeroCounterBound,
    #[error("max_threads must be nonzero")]
    ZeroMaxThreads,
    #[error("recycler pool size must be a nonzero power of two")]
    InvalidPoolSize,
}

/// Per-ticket approximate size accounting: `enqueue` increments, `dequeue`
/// decrements, on the calling thread's own slot only. Summing every slot
/// gives an approximate (not linearizable) total, the same shortcut the
/// chunk- and memory-bounded original proxies take for `size()`.
pub(crate) struct ThreadMetadata {
    deltas: Box<[std::sync::atomic::AtomicI64]>,
}

impl ThreadMetadata {
    pub(crate) fn new(max_threads: usize) -> Self {
        Self {
            deltas: (0..max_threads)
                .map(|_| std::sync::atomic::AtomicI64::new(0))
                .collect(),
        }
    }

    #[inline]
    pub(crate) fn record_enqueue(&self, ticket: usize) {
        self.deltas[ticket].fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dequeue(&self, ticket: usize) {
        self.deltas[ticket].fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
    }

    pub(crate) fn approximate_total(&self) -> i64 {
        self.deltas
            .iter()
            .map(|d| d.load(std::sync::atomic::Ordering::Relaxed))
            .sum()
    }
}
