use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

static MALLOCS: AtomicU64 = AtomicU64::new(0);
static FREES: AtomicU64 = AtomicU64::new(0);
static TOTAL_BYTES: AtomicU64 = AtomicU64::new(0);
static LIVE_BYTES: AtomicU64 = AtomicU64::new(0);

static FOREIGN_CALLS: AtomicU64 = AtomicU64::new(0);

/// Counting allocator that wraps the system allocator.
///
/// Opt in from the embedding binary:
///
/// ```ignore
/// #[global_allocator]
/// static GLOBAL: runtime_collector::CountingAlloc = runtime_collector::CountingAlloc;
/// ```
///
/// Without it the allocator counters reported by [`super::ProcessSource`]
/// stay at zero.
pub struct CountingAlloc;

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        record_free(layout.size());
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            // realloc counts as free + malloc
            record_free(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}

fn record_alloc(size: usize) {
    MALLOCS.fetch_add(1, Ordering::Relaxed);
    TOTAL_BYTES.fetch_add(size as u64, Ordering::Relaxed);
    LIVE_BYTES.fetch_add(size as u64, Ordering::Relaxed);
}

fn record_free(size: usize) {
    FREES.fetch_add(1, Ordering::Relaxed);
    LIVE_BYTES.fetch_sub(size as u64, Ordering::Relaxed);
}

/// Point-in-time view of the [`CountingAlloc`] counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocCounters {
    pub mallocs: u64,
    pub frees: u64,
    pub total_bytes: u64,
    pub live_bytes: u64,
}

impl AllocCounters {
    pub fn read() -> Self {
        AllocCounters {
            mallocs: MALLOCS.load(Ordering::Relaxed),
            frees: FREES.load(Ordering::Relaxed),
            total_bytes: TOTAL_BYTES.load(Ordering::Relaxed),
            live_bytes: LIVE_BYTES.load(Ordering::Relaxed),
        }
    }

    pub fn live_objects(&self) -> u64 {
        self.mallocs.saturating_sub(self.frees)
    }
}

/// Bump the process-wide foreign call counter. Call this from wrappers
/// around `extern` functions that should show up in `cpu.cgo_calls`.
pub fn record_foreign_call() {
    FOREIGN_CALLS.fetch_add(1, Ordering::Relaxed);
}

pub fn foreign_call_count() -> u64 {
    FOREIGN_CALLS.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_calls_accumulate() {
        let before = foreign_call_count();
        record_foreign_call();
        record_foreign_call();
        assert!(foreign_call_count() >= before + 2);
    }

    #[test]
    fn live_objects_never_underflow() {
        let counters = AllocCounters {
            mallocs: 3,
            frees: 5,
            total_bytes: 0,
            live_bytes: 0,
        };
        assert_eq!(counters.live_objects(), 0);
    }
}
