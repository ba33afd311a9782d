//! Debug assertion macros for the segment and proxy invariants this crate
//! documents.
//!
//! `debug_assert!` is already a no-op outside debug builds, so these cost
//! nothing in release; they exist to name each invariant at its check site
//! instead of leaving a bare condition for a reader to decode.
//!
//! Used across every segment variant (`sequenced`, `idx_sequenced`, `faa`)
//! and both proxies.

// =============================================================================
// INV-SEQ-01: Bounded Count
// =============================================================================

/// Assert that count does not exceed capacity.
///
/// **Invariant**: `0 ≤ (tail - head) ≤ capacity`
///
/// Used in: segment `enqueue()` implementations, right after a winning tail
/// CAS.
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "INV-SEQ-01 violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// Assert that head does not advance past tail.
///
/// **Invariant**: `head ≤ tail` (after advance)
///
/// Used in: segment `dequeue()` implementations, right after a winning head
/// CAS.
macro_rules! debug_assert_head_not_past_tail {
    ($new_head:expr, $tail:expr) => {
        debug_assert!(
            $new_head <= $tail,
            "INV-SEQ-01 violated: advancing head {} beyond tail {}",
            $new_head,
            $tail
        )
    };
}

// =============================================================================
// INV-SEQ-02: Monotonic Progress
// =============================================================================

/// Assert that a sequence number only increases (monotonic progress).
///
/// **Invariant**: `new_value ≥ old_value` (using wrapping comparison)
///
/// Used in: segment `enqueue()`/`dequeue()` after a winning tail/head CAS,
/// and the recycler's epoch advance.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "INV-SEQ-02 violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// INV-SEQ-03: No Wrap-Around (extremely unlikely but detectable)
// =============================================================================

/// Assert that we haven't wrapped around u64 sequence space.
///
/// **Invariant**: At 10B msg/sec, wrap takes ~58 years. This detects bugs where
/// sequence jumps backwards unexpectedly (not due to normal wrapping arithmetic).
///
/// Note: This uses strict `>` rather than `>=` because `new > old` detects
/// wrap-around (where new would be < old due to overflow).
///
/// Used in: the recycler's epoch advance, after a winning CAS.
macro_rules! debug_assert_no_wrap {
    ($name:literal, $old:expr, $new:expr) => {
        // In debug mode, detect if we somehow wrapped u64 (should never happen
        // in practice, but catches bugs where sequence jumps incorrectly)
        debug_assert!(
            $new > $old || $old.wrapping_sub($new) > (1u64 << 32),
            "INV-SEQ-03 potential wrap detected: {} went from {} to {} (delta: {})",
            $name,
            $old,
            $new,
            $new.wrapping_sub($old)
        )
    };
}

// =============================================================================
// INV-INIT-01: Initialized Range Check
// =============================================================================

/// Assert that we're reading from an initialized slot.
///
/// **Invariant**: `buffer[i] is initialized ⟺ head ≤ sequence(i) < tail`
///
/// Used in: segment `dequeue()` implementations, before `assume_init_read()`.
macro_rules! debug_assert_initialized_read {
    ($pos:expr, $head:expr, $tail:expr) => {
        debug_assert!(
            $pos >= $head && $pos < $tail,
            "INV-INIT-01 violated: reading slot at seq {} outside initialized range [{}, {})",
            $pos,
            $head,
            $tail
        )
    };
}

// =============================================================================
// INV-PTR-01: Pointer Validity
// =============================================================================

/// Assert that a hazard-protected segment pointer is not null before it is
/// dereferenced.
///
/// **Invariant**: every proxy head/tail read through the hazard array is
/// either the live sentinel or a pointer a prior `Box::into_raw` produced,
/// never null.
///
/// Used in: `HazardProxy::enqueue()`/`dequeue()`, right before
/// `unsafe { &*ptr }`.
macro_rules! debug_assert_valid_ring_ptr {
    ($ptr:expr) => {
        debug_assert!(!$ptr.is_null(), "INV-PTR-01 violated: null segment pointer")
    };
}

// =============================================================================
// INV-TKT-01: Ticket Uniqueness
// =============================================================================

/// Assert a ticket index is within the allocator's declared range.
///
/// **Invariant**: every live ticket lies in `[0, max_threads)`.
///
/// Used in: `TicketAllocator::acquire()` after a winning CAS.
macro_rules! debug_assert_ticket_in_range {
    ($ticket:expr, $max:expr) => {
        debug_assert!(
            $ticket < $max,
            "INV-TKT-01 violated: ticket {} outside [0, {})",
            $ticket,
            $max
        )
    };
}

// =============================================================================
// INV-REC-01: No Resurrection
// =============================================================================

/// Assert a slot index is not handed back out before the recycler's
/// bucket-rotation has moved it from grace into free.
///
/// **Invariant**: an index retired at epoch E is not reusable until the
/// global epoch has advanced past E+2.
///
/// Used in: `EpochRecycler::reclaim()` right before returning a slot.
macro_rules! debug_assert_no_resurrection {
    ($retired_epoch:expr, $current_epoch:expr) => {
        debug_assert!(
            $current_epoch >= $retired_epoch,
            "INV-REC-01 violated: reclaiming slot retired at epoch {} while global epoch is {}",
            $retired_epoch,
            $current_epoch
        )
    };
}

// =============================================================================
// INV-VIX-01: Versioned-Index ABA-Freedom
// =============================================================================

/// Assert a CAS on a versioned-index atomic only succeeds when both the
/// index and the version of the observed value matched.
///
/// Used in: proxy head/tail CAS sites that operate on `VersionedIndex`.
macro_rules! debug_assert_versioned_match {
    ($expected:expr, $actual:expr) => {
        debug_assert!(
            $expected == $actual,
            "INV-VIX-01 violated: versioned index mismatch, expected {:?}, observed {:?}",
            $expected,
            $actual
        )
    };
}

// =============================================================================
// INV-PAY-01: Reserved Sentinel Rejection
// =============================================================================

/// Assert an enqueued payload does not collide with a segment variant's
/// internally-reserved bit patterns (EMPTY/SEEN for the FAA variant, or a
/// per-thread tag for the sequenced-cell variant).
///
/// Used in: `enqueue()` entry points, before the value is ever written into a
/// slot.
macro_rules! debug_assert_not_reserved {
    ($is_reserved:expr) => {
        debug_assert!(
            !$is_reserved,
            "INV-PAY-01 violated: attempted to enqueue a reserved sentinel value"
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_head_not_past_tail;
pub(crate) use debug_assert_initialized_read;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_no_resurrection;
pub(crate) use debug_assert_no_wrap;
pub(crate) use debug_assert_not_reserved;
pub(crate) use debug_assert_ticket_in_range;
pub(crate) use debug_assert_valid_ring_ptr;
pub(crate) use debug_assert_versioned_match;
