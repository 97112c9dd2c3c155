use log::warn;
use parking_lot::Mutex;
use sysinfo::{Pid, System};

use super::counting::{foreign_call_count, AllocCounters};
use super::{MemStats, RuntimeSource};

/// [`RuntimeSource`] for the current Rust process.
///
/// The task count is the number of OS threads: `/proc/self/task` on Linux,
/// `proc_pidinfo` on macOS, and a constant 1 elsewhere. Tokio tasks are not
/// counted; use [`super::TokioTaskSource`] for those. Stack size comes from
/// procfs on Linux, resident memory from sysinfo, and allocator counters
/// from [`super::CountingAlloc`] when it is installed. There is no garbage
/// collector, so every GC statistic stays zero.
pub struct ProcessSource {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl ProcessSource {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                warn!("cannot resolve current pid, resident memory unavailable: {}", err);
                None
            }
        };

        ProcessSource {
            pid,
            system: Mutex::new(System::new()),
        }
    }

    fn resident_bytes(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return 0;
        }
        system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

impl Default for ProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeSource for ProcessSource {
    fn num_tasks(&self) -> u64 {
        thread_count()
    }

    fn num_foreign_calls(&self) -> u64 {
        foreign_call_count()
    }

    fn read_mem_stats(&self) -> MemStats {
        let counters = AllocCounters::read();
        let resident = self.resident_bytes();
        let stack = stack_bytes();

        MemStats {
            alloc: counters.live_bytes,
            total_alloc: counters.total_bytes,
            sys: resident,
            mallocs: counters.mallocs,
            frees: counters.frees,
            heap_alloc: counters.live_bytes,
            heap_sys: resident,
            heap_inuse: counters.live_bytes,
            heap_objects: counters.live_objects(),
            stack_inuse: stack,
            stack_sys: stack,
            ..MemStats::default()
        }
    }
}

#[cfg(target_os = "linux")]
fn thread_count() -> u64 {
    match std::fs::read_dir("/proc/self/task") {
        Ok(entries) => entries.filter(|entry| entry.is_ok()).count() as u64,
        Err(_) => 1,
    }
}

#[cfg(target_os = "macos")]
fn thread_count() -> u64 {
    let mut info = std::mem::MaybeUninit::<libc::proc_taskinfo>::zeroed();
    let size = std::mem::size_of::<libc::proc_taskinfo>() as libc::c_int;
    let written = unsafe {
        libc::proc_pidinfo(
            libc::getpid(),
            libc::PROC_PIDTASKINFO,
            0,
            info.as_mut_ptr() as *mut libc::c_void,
            size,
        )
    };
    if written != size {
        warn!("proc_pidinfo(PROC_PIDTASKINFO) returned {}", written);
        return 1;
    }
    let info = unsafe { info.assume_init() };
    u64::try_from(info.pti_threadnum).unwrap_or(1).max(1)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn thread_count() -> u64 {
    1
}

#[cfg(target_os = "linux")]
fn stack_bytes() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| parse_status_kib(&status, "VmStk:"))
        .map(|kib| kib * 1024)
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn stack_bytes() -> u64 {
    0
}

// Lines look like "VmStk:\t     132 kB".
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_status_kib(status: &str, key: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}
