use crate::runtime::{MemStats, PAUSE_HISTORY_LEN};

use super::types::{narrow, Fields};

/// Slot of the most recent pause in the circular pause history, assuming
/// `num_gc` only grows and the buffer has [`PAUSE_HISTORY_LEN`] slots.
pub fn recent_pause_index(num_gc: u32) -> usize {
    let len = PAUSE_HISTORY_LEN as u64;
    ((u64::from(num_gc) + len - 1) % len) as usize
}

pub(super) fn output_mem_stats(m: &MemStats, fields: &mut Fields) {
    // General
    fields.alloc = narrow(m.alloc);
    fields.total_alloc = narrow(m.total_alloc);
    fields.sys = narrow(m.sys);
    fields.lookups = narrow(m.lookups);
    fields.mallocs = narrow(m.mallocs);
    fields.frees = narrow(m.frees);

    // Heap
    fields.heap_alloc = narrow(m.heap_alloc);
    fields.heap_sys = narrow(m.heap_sys);
    fields.heap_idle = narrow(m.heap_idle);
    fields.heap_inuse = narrow(m.heap_inuse);
    fields.heap_released = narrow(m.heap_released);
    fields.heap_objects = narrow(m.heap_objects);

    // Stack
    fields.stack_inuse = narrow(m.stack_inuse);
    fields.stack_sys = narrow(m.stack_sys);
    fields.mspan_inuse = narrow(m.mspan_inuse);
    fields.mspan_sys = narrow(m.mspan_sys);
    fields.mcache_inuse = narrow(m.mcache_inuse);
    fields.mcache_sys = narrow(m.mcache_sys);

    fields.other_sys = narrow(m.other_sys);
}

pub(super) fn output_gc_stats(m: &MemStats, fields: &mut Fields) {
    fields.gc_sys = narrow(m.gc_sys);
    fields.next_gc = narrow(m.next_gc);
    fields.last_gc = narrow(m.last_gc);
    fields.pause_total_ns = narrow(m.pause_total_ns);
    fields.pause_ns = narrow(m.pause_ns[recent_pause_index(m.num_gc)]);
    fields.num_gc = i64::from(m.num_gc);
    fields.gc_cpu_fraction = m.gc_cpu_fraction;
}
