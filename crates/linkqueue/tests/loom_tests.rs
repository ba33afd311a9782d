//! Loom-based concurrency tests for linkqueue-rs.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Loom exhaustively explores thread interleavings, so these model the core
//! synchronization protocols in isolation with small, loom-native stand-ins
//! rather than the real (much larger) segment/recycler types directly,
//! since loom's state-space explosion makes running the production structs
//! directly impractical. Each model below captures exactly the invariant
//! its real counterpart in `src/` relies on.

#![cfg(feature = "loom")]

use loom::sync::atomic::{AtomicU64, Ordering};
use loom::sync::Arc;
use loom::thread;
use std::cell::UnsafeCell;

/// Sequenced-cell segment model, mirroring
/// `segment::sequenced::SequencedSegment`'s fill/drain handoff: a slot's
/// `seq` field gates visibility between the producer that claims it and the
/// consumer that reads it.
struct LoomSegment {
    tail: AtomicU64,
    head: AtomicU64,
    capacity: usize,
    slots: Box<[(UnsafeCell<u64>, AtomicU64)]>,
}

unsafe impl Send for LoomSegment {}
unsafe impl Sync for LoomSegment {}

impl LoomSegment {
    fn new(capacity: usize) -> Self {
        Self {
            tail: AtomicU64::new(0),
            head: AtomicU64::new(0),
            capacity,
            slots: (0..capacity)
                .map(|i| (UnsafeCell::new(0), AtomicU64::new(i as u64)))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    fn enqueue(&self, value: u64) -> bool {
        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            if tail as usize >= self.capacity {
                return false;
            }
            let (cell, seq) = &self.slots[tail as usize];
            if seq.load(Ordering::Acquire) != tail {
                continue;
            }
            if self
                .tail
                .compare_exchange(tail, tail + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                unsafe {
                    *cell.get() = value;
                }
                seq.store(tail + 1, Ordering::Release);
                return true;
            }
        }
    }

    fn dequeue(&self) -> Option<u64> {
        loop {
            let head = self.head.load(Ordering::Relaxed);
            if head as usize >= self.capacity {
                return None;
            }
            let (cell, seq) = &self.slots[head as usize];
            if seq.load(Ordering::Acquire) != head + 1 {
                return None;
            }
            if self
                .head
                .compare_exchange(head, head + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                let value = unsafe { *cell.get() };
                return Some(value);
            }
        }
    }
}

/// Two slots is the smallest capacity that still exercises a producer/
/// consumer race on the same index; loom's state space grows fast with
/// slot count so this stays deliberately tiny.
#[test]
fn loom_segment_single_producer_single_consumer_is_fifo() {
    loom::model(|| {
        let seg = Arc::new(LoomSegment::new(2));
        let producer = {
            let seg = Arc::clone(&seg);
            thread::spawn(move || {
                seg.enqueue(10);
                seg.enqueue(20);
            })
        };

        let consumer = thread::spawn(move || {
            let mut received = Vec::new();
            for _ in 0..2 {
                if let Some(v) = seg.dequeue() {
                    received.push(v);
                }
            }
            received
        });

        producer.join().unwrap();
        let received = consumer.join().unwrap();
        // whatever prefix was actually visible to the consumer must be in
        // submission order: no reordering, no duplication.
        if received.len() == 2 {
            assert_eq!(received, vec![10, 20]);
        } else if received.len() == 1 {
            assert_eq!(received[0], 10);
        }
    });
}

#[test]
fn loom_segment_rejects_past_capacity() {
    loom::model(|| {
        let seg = Arc::new(LoomSegment::new(1));
        let seg2 = Arc::clone(&seg);

        let t1 = thread::spawn(move || seg.enqueue(1));
        let t2 = thread::spawn(move || seg2.enqueue(2));

        let r1 = t1.join().unwrap();
        let r2 = t2.join().unwrap();
        // exactly one producer wins the single slot.
        assert_ne!(r1, r2);
    });
}

/// Bounded MPMC slot ring model, mirroring `bucket::IndexBucket`'s
/// sequence-number handoff: two producers race for the same two slots, one
/// consumer drains them. No slot may be handed to two producers, and no
/// value may be observed twice.
struct LoomBucket {
    enqueue_pos: AtomicU64,
    dequeue_pos: AtomicU64,
    capacity: usize,
    mask: usize,
    slots: Box<[(UnsafeCell<u64>, AtomicU64)]>,
}

unsafe impl Send for LoomBucket {}
unsafe impl Sync for LoomBucket {}

impl LoomBucket {
    fn new(capacity: usize) -> Self {
        Self {
            enqueue_pos: AtomicU64::new(0),
            dequeue_pos: AtomicU64::new(0),
            capacity,
            mask: capacity - 1,
            slots: (0..capacity)
                .map(|i| (UnsafeCell::new(0), AtomicU64::new(i as u64)))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    fn enqueue(&self, value: u64) -> bool {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let (cell, seq) = &self.slots[pos as usize & self.mask];
            let observed = seq.load(Ordering::Acquire);
            if observed == pos {
                if self
                    .enqueue_pos
                    .compare_exchange(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    unsafe {
                        *cell.get() = value;
                    }
                    seq.store(pos + 1, Ordering::Release);
                    return true;
                }
            } else if (observed as i64) < pos as i64 {
                return false;
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    fn dequeue(&self) -> Option<u64> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let (cell, seq) = &self.slots[pos as usize & self.mask];
            let observed = seq.load(Ordering::Acquire);
            if observed == pos + 1 {
                if self
                    .dequeue_pos
                    .compare_exchange(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    let value = unsafe { *cell.get() };
                    seq.store(pos + self.capacity as u64, Ordering::Release);
                    return Some(value);
                }
            } else if (observed as i64) < (pos + 1) as i64 {
                return None;
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }
}

#[test]
fn loom_bucket_concurrent_producers_never_collide() {
    loom::model(|| {
        let bucket = Arc::new(LoomBucket::new(2));
        let b1 = Arc::clone(&bucket);
        let b2 = Arc::clone(&bucket);

        let p1 = thread::spawn(move || b1.enqueue(1));
        let p2 = thread::spawn(move || b2.enqueue(2));
        let r1 = p1.join().unwrap();
        let r2 = p2.join().unwrap();
        assert!(r1 && r2, "both producers must land their own slot");

        let mut seen = Vec::new();
        while let Some(v) = bucket.dequeue() {
            seen.push(v);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);
    });
}
