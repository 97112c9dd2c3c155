use crate::runtime::RuntimeSource;

use super::types::{narrow, Fields};

pub(super) struct CpuStats {
    pub num_tasks: u64,
    pub num_foreign_calls: u64,
}

impl CpuStats {
    pub fn read(source: &dyn RuntimeSource) -> Self {
        CpuStats {
            num_tasks: source.num_tasks(),
            num_foreign_calls: source.num_foreign_calls(),
        }
    }
}

pub(super) fn output_cpu_stats(stats: &CpuStats, fields: &mut Fields) {
    fields.num_tasks = narrow(stats.num_tasks);
    fields.num_foreign_calls = narrow(stats.num_foreign_calls);
}
