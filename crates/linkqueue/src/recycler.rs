//! Epoch-based recycler: a fixed pool of `N` reusable slot indices, reclaimed
//! in batches gated by a global epoch instead of per-pointer hazard tracking.
//!
//! Grounded directly on the original's `Recycler<T, Capacity>`: four index
//! buckets rotate through the roles *current*/*grace*/*free*/*next* as
//! `(epoch + role_offset) % 4`; retiring places an index in *grace*,
//! reclaiming drains *free*, and the epoch only advances when every
//! registered ticket is either inactive or still active at the epoch being
//! left behind.

use crate::bucket::IndexBucket;
use crate::epoch::EpochCell;
use crate::invariants::{debug_assert_no_resurrection, debug_assert_no_wrap};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BucketRole {
    Current = 0,
    Next = 1,
    Free = 2,
    Grace = 3,
}

/// Fixed-size pool of reusable indices, reclaimed under epoch protection.
pub struct EpochRecycler {
    epoch: AtomicU64,
    buckets: [IndexBucket; 4],
    per_ticket_epoch: Box<[EpochCell]>,
    max_threads: usize,
    pool_size: usize,
}

impl EpochRecycler {
    /// `pool_size` must be a power of two (bucket capacity requirement);
    /// `max_threads` bounds the ticket-indexed epoch-cell array.
    pub fn new(pool_size: usize, max_threads: usize) -> Self {
        let buckets = [
            IndexBucket::new(pool_size),
            IndexBucket::new(pool_size),
            IndexBucket::new(pool_size),
            IndexBucket::new(pool_size),
        ];
        // epoch 0: role Free lives at bucket (0 + 2) & 3 == 2.
        for i in 0..pool_size {
            buckets[2].enqueue(i);
        }
        Self {
            epoch: AtomicU64::new(0),
            buckets,
            per_ticket_epoch: (0..max_threads).map(|_| EpochCell::new()).collect(),
            max_threads,
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    fn bucket(&self, epoch: u64, role: BucketRole) -> &IndexBucket {
        let offset = role as u64;
        &self.buckets[((epoch + offset) & 3) as usize]
    }

    /// Publishes `(active=true, epoch=current)` for `ticket`.
    pub fn protect_epoch(&self, ticket: usize) {
        let current = self.epoch.load(Ordering::Acquire);
        self.per_ticket_epoch[ticket].protect(current);
    }

    /// Clears `ticket`'s active flag, leaving its last-observed epoch.
    pub fn clear_epoch(&self, ticket: usize) {
        self.per_ticket_epoch[ticket].clear();
    }

    /// Protect/load/verify loop over an atomic value, publishing the
    /// current epoch the whole time so a racing retire can't outrun us.
    pub fn protect_epoch_and_load(&self, ticket: usize, atom: &AtomicU64) -> u64 {
        loop {
            let current = self.epoch.load(Ordering::Acquire);
            self.per_ticket_epoch[ticket].protect(current);
            let val = atom.load(Ordering::Acquire);
            if val == atom.load(Ordering::Acquire) {
                return val;
            }
        }
    }

    /// Places `idx` into the grace bucket of the epoch `ticket` currently
    /// observes (protecting it first if `ticket` wasn't already active).
    pub fn retire(&self, idx: usize, ticket: usize) {
        let snap = self.per_ticket_epoch[ticket].snapshot();
        let epoch = if snap.active {
            snap.epoch
        } else {
            let current = self.epoch.load(Ordering::Acquire);
            self.per_ticket_epoch[ticket].protect(current);
            current
        };

        self.bucket(epoch, BucketRole::Grace).enqueue(idx);

        if !snap.active {
            self.per_ticket_epoch[ticket].clear();
        }
    }

    /// Attempts to hand back a free pool index, trying up to three times to
    /// advance the epoch (the bucket cycle length) before giving up.
    pub fn reclaim(&self, ticket: usize) -> Option<usize> {
        let snap = self.per_ticket_epoch[ticket].snapshot();
        let mut epoch = snap.epoch;
        const MAX_ATTEMPTS: usize = 3;
        let mut got = None;

        for _ in 0..MAX_ATTEMPTS {
            if !snap.active {
                epoch = self.epoch.load(Ordering::Acquire);
                self.per_ticket_epoch[ticket].protect(epoch);
            }

            let mut idx = 0usize;
            if self.bucket(epoch, BucketRole::Free).dequeue(&mut idx) {
                debug_assert_no_resurrection!(epoch, self.epoch.load(Ordering::Acquire));
                got = Some(idx);
                break;
            }

            if self.can_advance_epoch(epoch) {
                if self
                    .epoch
                    .compare_exchange(epoch, epoch + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    debug_assert_no_wrap!("epoch", epoch, epoch + 1);
                }
            }

            if self.epoch.load(Ordering::Acquire) == epoch {
                break;
            }
        }

        if !snap.active {
            self.per_ticket_epoch[ticket].clear();
        }
        got
    }

    /// The epoch may advance past `expected_epoch` only if every ticket is
    /// either inactive or still active at exactly `expected_epoch`.
    fn can_advance_epoch(&self, expected_epoch: u64) -> bool {
        if self.epoch.load(Ordering::Relaxed) != expected_epoch {
            return false;
        }
        for i in 0..self.max_threads {
            let snap = self.per_ticket_epoch[i].snapshot();
            if snap.active && snap.epoch != expected_epoch {
                return false;
            }
        }
        true
    }
}
