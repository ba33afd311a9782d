use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for monitoring proxy/segment throughput.
///
/// All fields are independent atomics updated with `Relaxed` ordering:
/// metrics are diagnostic, not synchronizing, so no happens-before
/// relationship is needed between a counter bump and the operation it
/// describes.
#[derive(Debug, Default)]
pub struct Metrics {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    segments_linked: AtomicU64,
    segments_retired: AtomicU64,
    reclaim_retries: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_enqueued(&self, n: u64) {
        self.enqueued.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_dequeued(&self, n: u64) {
        self.dequeued.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_segments_linked(&self, n: u64) {
        self.segments_linked.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_segments_retired(&self, n: u64) {
        self.segments_retired.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_reclaim_retries(&self, n: u64) {
        self.reclaim_retries.fetch_add(n, Ordering::Relaxed);
    }

    /// Takes a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            segments_linked: self.segments_linked.load(Ordering::Relaxed),
            segments_retired: self.segments_retired.load(Ordering::Relaxed),
            reclaim_retries: self.reclaim_retries.load(Ordering::Relaxed),
        }
    }
}

/// A plain-data copy of [`Metrics`] taken at one moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub dequeued: u64,
    pub segments_linked: u64,
    pub segments_retired: u64,
    pub reclaim_retries: u64,
}
