mod counting;
mod process;
mod tasks;

use std::sync::Arc;

pub use counting::{foreign_call_count, record_foreign_call, AllocCounters, CountingAlloc};
pub use process::ProcessSource;
pub use tasks::TokioTaskSource;

/// Number of slots in the circular GC pause history of [`MemStats`].
pub const PAUSE_HISTORY_LEN: usize = 256;

/// Runtime introspection the collector samples from.
///
/// Implementations are expected to be cheap and infallible; the collector
/// calls them while holding its snapshot lock.
pub trait RuntimeSource: Send + Sync {
    /// Current number of concurrently schedulable execution units. What
    /// counts as one is up to the source: [`ProcessSource`] reports OS
    /// threads, [`TokioTaskSource`] reports live tokio tasks.
    fn num_tasks(&self) -> u64;

    /// Number of calls made into foreign code so far.
    fn num_foreign_calls(&self) -> u64;

    /// A fresh memory and GC statistics record.
    fn read_mem_stats(&self) -> MemStats;
}

impl<T: RuntimeSource + ?Sized> RuntimeSource for Arc<T> {
    fn num_tasks(&self) -> u64 {
        (**self).num_tasks()
    }

    fn num_foreign_calls(&self) -> u64 {
        (**self).num_foreign_calls()
    }

    fn read_mem_stats(&self) -> MemStats {
        (**self).read_mem_stats()
    }
}

impl<T: RuntimeSource + ?Sized> RuntimeSource for Box<T> {
    fn num_tasks(&self) -> u64 {
        (**self).num_tasks()
    }

    fn num_foreign_calls(&self) -> u64 {
        (**self).num_foreign_calls()
    }

    fn read_mem_stats(&self) -> MemStats {
        (**self).read_mem_stats()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemStats {
    // General
    pub alloc: u64,
    pub total_alloc: u64,
    pub sys: u64,
    pub lookups: u64,
    pub mallocs: u64,
    pub frees: u64,

    // Heap
    pub heap_alloc: u64,
    pub heap_sys: u64,
    pub heap_idle: u64,
    pub heap_inuse: u64,
    pub heap_released: u64,
    pub heap_objects: u64,

    // Stack and allocator bookkeeping
    pub stack_inuse: u64,
    pub stack_sys: u64,
    pub mspan_inuse: u64,
    pub mspan_sys: u64,
    pub mcache_inuse: u64,
    pub mcache_sys: u64,
    pub other_sys: u64,

    // GC
    pub gc_sys: u64,
    pub next_gc: u64,
    /// Nanoseconds since the Unix epoch, zero if no GC has run.
    pub last_gc: u64,
    pub pause_total_ns: u64,
    /// Circular buffer of recent pause durations; the latest pause lives at
    /// `(num_gc + 255) % 256`.
    pub pause_ns: [u64; PAUSE_HISTORY_LEN],
    pub num_gc: u32,
    pub gc_cpu_fraction: f64,
}

impl Default for MemStats {
    fn default() -> Self {
        MemStats {
            alloc: 0,
            total_alloc: 0,
            sys: 0,
            lookups: 0,
            mallocs: 0,
            frees: 0,
            heap_alloc: 0,
            heap_sys: 0,
            heap_idle: 0,
            heap_inuse: 0,
            heap_released: 0,
            heap_objects: 0,
            stack_inuse: 0,
            stack_sys: 0,
            mspan_inuse: 0,
            mspan_sys: 0,
            mcache_inuse: 0,
            mcache_sys: 0,
            other_sys: 0,
            gc_sys: 0,
            next_gc: 0,
            last_gc: 0,
            pause_total_ns: 0,
            pause_ns: [0; PAUSE_HISTORY_LEN],
            num_gc: 0,
            gc_cpu_fraction: 0.0,
        }
    }
}
