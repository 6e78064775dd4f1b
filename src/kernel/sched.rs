//! Real-time scheduling through libc

use serde::{Deserialize, Serialize};
use std::io;
use std::thread::JoinHandle;

use crate::types::Priority;

/// Scheduling policy applied to worker threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedPolicy {
    /// Keep the policy the process runs with; priorities are recorded only.
    /// Samples taken this way are not preemption round trips.
    Inherit,
    /// Strict fixed-priority preemption (`SCHED_FIFO`), no time slicing
    #[default]
    Fifo,
}

/// Apply `policy` at `priority` to a spawned thread.
///
/// Returns the platform priority that was set, or `None` under
/// [`SchedPolicy::Inherit`].
#[cfg(unix)]
pub fn apply<T>(
    handle: &JoinHandle<T>,
    policy: SchedPolicy,
    priority: Priority,
) -> io::Result<Option<i32>> {
    use std::os::unix::thread::JoinHandleExt;

    match policy {
        SchedPolicy::Inherit => Ok(None),
        SchedPolicy::Fifo => {
            let native = libc::SCHED_FIFO;
            let (min, max) = unsafe {
                (
                    libc::sched_get_priority_min(native),
                    libc::sched_get_priority_max(native),
                )
            };
            if min < 0 || max < 0 {
                return Err(io::Error::last_os_error());
            }

            let platform = priority.to_platform(min, max);
            let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
            param.sched_priority = platform;

            let rc = unsafe { libc::pthread_setschedparam(handle.as_pthread_t(), native, &param) };
            if rc != 0 {
                return Err(io::Error::from_raw_os_error(rc));
            }
            Ok(Some(platform))
        }
    }
}

#[cfg(not(unix))]
pub fn apply<T>(
    _handle: &JoinHandle<T>,
    policy: SchedPolicy,
    _priority: Priority,
) -> io::Result<Option<i32>> {
    match policy {
        SchedPolicy::Inherit => Ok(None),
        SchedPolicy::Fifo => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "fixed-priority scheduling is not available on this platform",
        )),
    }
}
