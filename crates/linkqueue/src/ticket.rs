//! Thread-ticket allocator.
//!
//! Hands every calling thread a dense integer in `[0, max_threads)` per
//! allocator instance, cached in thread-local storage so repeated `acquire`
//! calls by the same thread are a single TLS read. Up to [`MAX_INSTANCES`]
//! allocator instances can coexist in one process; a thread may hold
//! independent tickets on several of them at once.

use crate::invariants::debug_assert_ticket_in_range;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Compile-time cap on concurrently live allocator instances.
pub const MAX_INSTANCES: usize = 16;

/// Compile-time cap on tickets per instance (bits per allocator).
pub const MAX_THREADS_HARD_CAP: usize = 1024;

const CELLS: usize = MAX_THREADS_HARD_CAP / 64;

const NO_TICKET: u64 = u64::MAX;

std::thread_local! {
    static TLS_TICKETS: [Cell<u64>; MAX_INSTANCES] = [const { Cell::new(NO_TICKET) }; MAX_INSTANCES];
}

static INSTANCE_BITMAP: AtomicU64 = AtomicU64::new(u64::MAX >> (64 - MAX_INSTANCES));

fn allocate_instance_id() -> usize {
    let mut cur = INSTANCE_BITMAP.load(Ordering::Relaxed);
    loop {
        if cur == 0 {
            panic!("too many TicketAllocator instances live at once (max {MAX_INSTANCES})");
        }
        let bit = cur.trailing_zeros() as usize;
        let mask = 1u64 << bit;
        match INSTANCE_BITMAP.compare_exchange_weak(
            cur,
            cur & !mask,
            Ordering::Acquire,
            Ordering::Relaxed,
        ) {
            Ok(_) => return bit,
            Err(observed) => cur = observed,
        }
    }
}

fn free_instance_id(id: usize) {
    if id >= MAX_INSTANCES {
        return;
    }
    INSTANCE_BITMAP.fetch_or(1u64 << id, Ordering::Release);
}

/// Bitset-based ticket allocator: a thread calls [`acquire`](Self::acquire)
/// once and reuses the returned ticket for the lifetime of its work on this
/// allocator's owning proxy.
#[derive(Debug)]
pub struct TicketAllocator {
    instance_id: usize,
    max_threads: usize,
    // storage[i] bit j == 1 means ticket (i*64 + j) is free.
    storage: Box<[AtomicU64]>,
}

impl TicketAllocator {
    /// Creates a new allocator with room for `max_threads` tickets.
    ///
    /// # Panics
    ///
    /// Panics if `max_threads` is zero, exceeds [`MAX_THREADS_HARD_CAP`], or
    /// if all [`MAX_INSTANCES`] instance slots are already in use.
    pub fn new(max_threads: usize) -> Self {
        assert!(max_threads > 0, "max_threads must be nonzero");
        assert!(
            max_threads <= MAX_THREADS_HARD_CAP,
            "max_threads exceeds hard cap of {MAX_THREADS_HARD_CAP}"
        );

        let instance_id = allocate_instance_id();
        let cells = CELLS.min(max_threads.div_ceil(64).max(1));
        let mut remaining = max_threads;
        let storage: Vec<AtomicU64> = (0..cells)
            .map(|_| {
                let bits = if remaining >= 64 {
                    remaining -= 64;
                    u64::MAX
                } else if remaining > 0 {
                    let b = (1u64 << remaining) - 1;
                    remaining = 0;
                    b
                } else {
                    0
                };
                AtomicU64::new(bits)
            })
            .collect();

        Self {
            instance_id,
            max_threads,
            storage: storage.into_boxed_slice(),
        }
    }

    /// The runtime cap this allocator was constructed with.
    #[inline]
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Acquires a ticket for the calling thread.
    ///
    /// Returns the same ticket on every call from the same thread until
    /// [`release`](Self::release) is called. Returns `false` if no ticket is
    /// free and this thread does not already hold one.
    pub fn acquire(&self, out_ticket: &mut usize) -> bool {
        let cached = TLS_TICKETS.with(|tls| tls[self.instance_id].get());
        if cached != NO_TICKET {
            *out_ticket = cached as usize;
            return true;
        }

        for (cell_idx, cell) in self.storage.iter().enumerate() {
            let mut cur = cell.load(Ordering::Relaxed);
            while cur != 0 {
                let bit = cur.trailing_zeros() as usize;
                let ticket = cell_idx * 64 + bit;
                if ticket >= self.max_threads {
                    break;
                }
                let mask = 1u64 << bit;
                match cell.compare_exchange_weak(
                    cur,
                    cur & !mask,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        debug_assert_ticket_in_range!(ticket, self.max_threads);
                        TLS_TICKETS.with(|tls| tls[self.instance_id].set(ticket as u64));
                        *out_ticket = ticket;
                        return true;
                    }
                    Err(observed) => cur = observed,
                }
            }
        }
        false
    }

    /// Releases the ticket held by the calling thread, if any. Idempotent.
    pub fn release(&self) {
        let held = TLS_TICKETS.with(|tls| {
            let slot = &tls[self.instance_id];
            let ticket = slot.get();
            slot.set(NO_TICKET);
            ticket
        });
        if held == NO_TICKET {
            return;
        }
        let ticket = held as usize;
        let cell = ticket / 64;
        let bit = ticket % 64;
        self.storage[cell].fetch_or(1u64 << bit, Ordering::Release);
    }
}

impl Drop for TicketAllocator {
    fn drop(&mut self) {
        free_instance_id(self.instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn acquire_is_idempotent_per_thread() {
        let alloc = TicketAllocator::new(4);
        let mut t1 = 0;
        let mut t2 = 0;
        assert!(alloc.acquire(&mut t1));
        assert!(alloc.acquire(&mut t2));
        assert_eq!(t1, t2);
    }

    #[test]
    fn exhaustion_is_visible_to_a_fresh_thread() {
        let alloc = TicketAllocator::new(2);
        thread::scope(|scope| {
            let tickets: Vec<usize> = (0..2)
                .map(|_| {
                    scope
                        .spawn(|| {
                            let mut t = 0;
                            assert!(alloc.acquire(&mut t));
                            t
                        })
                        .join()
                        .unwrap()
                })
                .collect();
            assert_ne!(tickets[0], tickets[1]);

            // neither holder released, so a thread with no cached ticket
            // observes the pool as exhausted.
            scope.spawn(|| {
                let mut overflow = 0;
                assert!(!alloc.acquire(&mut overflow));
            })
            .join()
            .unwrap();
        });
    }

    #[test]
    fn release_then_reacquire_gets_same_lowest_ticket() {
        let alloc = TicketAllocator::new(3);
        let mut a = 0;
        let mut b = 0;
        assert!(alloc.acquire(&mut a));
        alloc.release();
        assert!(alloc.acquire(&mut b));
        assert_eq!(a, b);
    }
}
