//! Hazard-pointer array.
//!
//! One slot per ticket publishes the pointer that ticket is currently
//! dereferencing; [`retire`](HazardArray::retire) only frees a pointer once
//! no slot (other than the retiring one) still holds it. This is the
//! pointer-linked sibling of [`crate::recycler`]'s index-linked reclaimer.

use crate::segment::CacheAligned;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// One hazard slot per ticket. `T` is the segment type being protected.
struct Cell<T> {
    slot: CacheAligned<AtomicPtr<T>>,
    retired: CacheAligned<std::sync::Mutex<Vec<*mut T>>>,
}

unsafe impl<T: Send> Send for Cell<T> {}
unsafe impl<T: Send> Sync for Cell<T> {}

/// A hazard-pointer array sized for `max_threads` tickets.
pub struct HazardArray<T> {
    cells: Box<[Cell<T>]>,
}

impl<T> HazardArray<T> {
    pub fn new(max_threads: usize) -> Self {
        let cells = (0..max_threads)
            .map(|_| Cell {
                slot: CacheAligned::new(AtomicPtr::new(ptr::null_mut())),
                retired: CacheAligned::new(std::sync::Mutex::new(Vec::new())),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { cells }
    }

    /// Publishes `ptr` directly into `ticket`'s slot.
    #[inline]
    pub fn protect_ptr(&self, ticket: usize, ptr: *mut T) -> *mut T {
        self.cells[ticket].slot.store(ptr, Ordering::Release);
        ptr
    }

    /// Publish/load/verify loop over an atomic reference: loads `atom`,
    /// publishes the value, and reloads to confirm it did not change in the
    /// meantime. Loops until a stable value is observed.
    pub fn protect(&self, atom: &AtomicPtr<T>, ticket: usize) -> *mut T {
        loop {
            let observed = atom.load(Ordering::Acquire);
            self.cells[ticket].slot.store(observed, Ordering::Release);
            if atom.load(Ordering::Acquire) == observed {
                return observed;
            }
        }
    }

    /// Clears `ticket`'s hazard slot.
    #[inline]
    pub fn clear(&self, ticket: usize) {
        self.cells[ticket].slot.store(ptr::null_mut(), Ordering::Release);
    }

    /// True if any ticket other than `ticket` currently protects `ptr`.
    pub fn is_protected(&self, ptr: *mut T, ticket: usize) -> bool {
        self.cells
            .iter()
            .enumerate()
            .any(|(i, cell)| i != ticket && cell.slot.load(Ordering::Acquire) == ptr)
    }

    /// Retires `ptr` into `ticket`'s retire list, then sweeps that list for
    /// anything no longer protected and frees it.
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated with `Box::into_raw` and must never be
    /// dereferenced again by the caller after this call.
    pub unsafe fn retire(&self, ptr: *mut T, ticket: usize) {
        if ptr.is_null() {
            return;
        }
        let mut retired = self.cells[ticket].retired.lock().unwrap();
        retired.push(ptr);
        retired.retain(|&candidate| {
            if self.is_protected(candidate, ticket) {
                true
            } else {
                unsafe {
                    drop(Box::from_raw(candidate));
                }
                false
            }
        });
    }
}

impl<T> Drop for HazardArray<T> {
    fn drop(&mut self) {
        for cell in self.cells.iter_mut() {
            let mut retired = cell.retired.lock().unwrap();
            for ptr in retired.drain(..) {
                unsafe {
                    drop(Box::from_raw(ptr));
                }
            }
        }
    }
}
