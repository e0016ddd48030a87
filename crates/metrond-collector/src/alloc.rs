//! A counting global allocator.
//!
//! Wraps the system allocator and keeps running totals so the runtime
//! collector can report real heap figures. The agent binary installs it
//! with `#[global_allocator]`; the counters stay at zero otherwise.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

static ALLOCATED: AtomicU64 = AtomicU64::new(0);
static TOTAL_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static MALLOCS: AtomicU64 = AtomicU64::new(0);
static FREES: AtomicU64 = AtomicU64::new(0);

pub struct CountingAlloc;

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            ALLOCATED.fetch_add(layout.size() as u64, Ordering::Relaxed);
            TOTAL_ALLOCATED.fetch_add(layout.size() as u64, Ordering::Relaxed);
            MALLOCS.fetch_add(1, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            ALLOCATED.fetch_add(layout.size() as u64, Ordering::Relaxed);
            TOTAL_ALLOCATED.fetch_add(layout.size() as u64, Ordering::Relaxed);
            MALLOCS.fetch_add(1, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        ALLOCATED.fetch_sub(layout.size() as u64, Ordering::Relaxed);
        FREES.fetch_add(1, Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            ALLOCATED.fetch_add(new_size as u64, Ordering::Relaxed);
            ALLOCATED.fetch_sub(layout.size() as u64, Ordering::Relaxed);
            if new_size > layout.size() {
                TOTAL_ALLOCATED.fetch_add((new_size - layout.size()) as u64, Ordering::Relaxed);
            }
        }
        new_ptr
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AllocStats {
    /// Bytes currently allocated.
    pub allocated: u64,
    /// Cumulative bytes allocated since process start.
    pub total_allocated: u64,
    pub mallocs: u64,
    pub frees: u64,
}

pub fn stats() -> AllocStats {
    AllocStats {
        allocated: ALLOCATED.load(Ordering::Relaxed),
        total_allocated: TOTAL_ALLOCATED.load(Ordering::Relaxed),
        mallocs: MALLOCS.load(Ordering::Relaxed),
        frees: FREES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_alloc_and_dealloc() {
        let layout = Layout::from_size_align(256, 8).unwrap();
        let before = stats();

        let ptr = unsafe { CountingAlloc.alloc(layout) };
        assert!(!ptr.is_null());
        let mid = stats();
        assert_eq!(mid.mallocs, before.mallocs + 1);
        assert_eq!(mid.total_allocated, before.total_allocated + 256);
        assert_eq!(mid.allocated, before.allocated + 256);

        unsafe { CountingAlloc.dealloc(ptr, layout) };
        let after = stats();
        assert_eq!(after.frees, mid.frees + 1);
        assert_eq!(after.allocated, before.allocated);
        // cumulative total never decreases
        assert_eq!(after.total_allocated, mid.total_allocated);
    }
}
