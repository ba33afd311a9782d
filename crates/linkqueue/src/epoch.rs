//! Single-writer/multi-reader epoch cell.
//!
//! One [`EpochCell`] per ticket records whether that thread is currently
//! "active" (inside a protected critical section against the recycler's
//! global epoch) and, if so, which epoch it observed when it became active.
//! The recycler may only advance the global epoch past a value that every
//! active cell has moved beyond.

use std::sync::atomic::{AtomicU64, Ordering};

const ACTIVE_BIT: u64 = 1 << 63;
const EPOCH_MASK: u64 = ACTIVE_BIT - 1;

/// A packed `(active: bool, epoch: u63)` pair in one atomic word.
#[derive(Debug, Default)]
pub struct EpochCell(AtomicU64);

/// A point-in-time read of an [`EpochCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochSnapshot {
    pub active: bool,
    pub epoch: u64,
}

impl EpochCell {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Publishes `(active = true, epoch)` in a single atomic write.
    #[inline]
    pub fn protect(&self, epoch: u64) {
        debug_assert!(epoch <= EPOCH_MASK, "epoch overflowed 63 bits");
        self.0.store(ACTIVE_BIT | (epoch & EPOCH_MASK), Ordering::Release);
    }

    /// Clears the active bit, leaving the last-observed epoch in place.
    #[inline]
    pub fn clear(&self) {
        let cur = self.0.load(Ordering::Relaxed);
        self.0.store(cur & EPOCH_MASK, Ordering::Release);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire) & ACTIVE_BIT != 0
    }

    /// Reads the active flag and observed epoch together.
    #[inline]
    pub fn snapshot(&self) -> EpochSnapshot {
        let raw = self.0.load(Ordering::Acquire);
        EpochSnapshot {
            active: raw & ACTIVE_BIT != 0,
            epoch: raw & EPOCH_MASK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protect_then_clear_round_trips_epoch() {
        let cell = EpochCell::new();
        cell.protect(7);
        let snap = cell.snapshot();
        assert!(snap.active);
        assert_eq!(snap.epoch, 7);

        cell.clear();
        let snap = cell.snapshot();
        assert!(!snap.active);
        assert_eq!(snap.epoch, 7);
    }

    #[test]
    fn fresh_cell_is_inactive() {
        let cell = EpochCell::new();
        assert!(!cell.is_active());
    }
}
