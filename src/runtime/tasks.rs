use tokio::runtime::Handle;

use super::{MemStats, ProcessSource, RuntimeSource};

/// [`RuntimeSource`] that reports live tokio tasks instead of OS threads.
///
/// The task count is `num_alive_tasks` of the runtime behind `handle`;
/// foreign calls and memory statistics come from a [`ProcessSource`].
pub struct TokioTaskSource {
    handle: Handle,
    process: ProcessSource,
}

impl TokioTaskSource {
    pub fn new(handle: Handle) -> Self {
        TokioTaskSource {
            handle,
            process: ProcessSource::new(),
        }
    }

    /// Source for the runtime the caller runs on, `None` outside of one.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl RuntimeSource for TokioTaskSource {
    fn num_tasks(&self) -> u64 {
        self.handle.metrics().num_alive_tasks() as u64
    }

    fn num_foreign_calls(&self) -> u64 {
        self.process.num_foreign_calls()
    }

    fn read_mem_stats(&self) -> MemStats {
        self.process.read_mem_stats()
    }
}
