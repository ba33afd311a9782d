/// Configuration shared by segments, the ticket allocator and the proxy
/// capacity policies.
///
/// The original C++ design threaded most of these through template
/// parameters (`Capacity`, `MaxThreads`, `ChunkFactor`, `Pow2`). Rust
/// generics make the per-type ones (`segment_bits`, see
/// `crate::segment::sequenced::SequencedSegment`) const generics instead,
/// and `Config` carries the remaining runtime knobs a caller picks once at
/// construction.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Segment capacity as a power of two (default: 10 = 1024 slots).
    pub segment_bits: u8,
    /// Upper bound on concurrently-registered threads (ticket space size).
    pub max_threads: usize,
    /// Number of segments a chunk-bounded proxy may keep linked at once.
    pub chunk_factor: usize,
    /// Enable metrics collection (slight overhead on the hot path).
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a new configuration with custom settings.
    ///
    /// # Panics
    ///
    /// Panics if `segment_bits` is zero or greater than 24, if
    /// `max_threads` is zero or greater than 128, or if `chunk_factor` is
    /// zero.
    pub const fn new(
        segment_bits: u8,
        max_threads: usize,
        chunk_factor: usize,
        enable_metrics: bool,
    ) -> Self {
        assert!(
            segment_bits > 0 && segment_bits <= 24,
            "segment_bits must be between 1 and 24"
        );
        assert!(
            max_threads > 0 && max_threads <= 128,
            "max_threads must be between 1 and 128"
        );
        assert!(chunk_factor > 0, "chunk_factor must be at least 1");

        Self {
            segment_bits,
            max_threads,
            chunk_factor,
            enable_metrics,
        }
    }

    /// Returns the capacity of a single segment.
    #[inline]
    pub const fn segment_capacity(&self) -> usize {
        1 << self.segment_bits
    }

    /// Returns the index mask for a single segment.
    #[inline]
    pub const fn segment_mask(&self) -> usize {
        self.segment_capacity() - 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segment_bits: 10, // 1024 slots
            max_threads: 16,
            chunk_factor: 4,
            enable_metrics: false,
        }
    }
}

/// Tuned for small, latency-sensitive queues (one segment fits in L1/L2).
pub const LOW_LATENCY_CONFIG: Config = Config::new(8, 16, 2, false);

/// Tuned for sustained high-throughput producer/consumer fan-in.
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(14, 32, 8, false);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_matches_bits() {
        let cfg = Config::new(4, 8, 2, false);
        assert_eq!(cfg.segment_capacity(), 16);
        assert_eq!(cfg.segment_mask(), 15);
    }

    #[test]
    #[should_panic(expected = "segment_bits")]
    fn rejects_zero_segment_bits() {
        let _ = Config::new(0, 8, 2, false);
    }
}
