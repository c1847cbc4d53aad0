//! Real-time process setup for the control loop.
//!
//! Linux: SCHED_FIFO, single-CPU affinity and `mlockall`. macOS: `mlockall`
//! only. Every step is best-effort; a failure is logged and the run goes on
//! with normal scheduling.

use crate::cli::RtLock;

/// Apply real-time settings once per process. No-op unless `rt` is set.
pub fn setup_rt_once(rt: bool, prio: Option<i32>, lock: RtLock, cpu: Option<usize>) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }
    RT_ONCE.get_or_init(|| {
        match lock_memory(lock) {
            Ok(()) => tracing::info!(?lock, "rt: memory lock applied"),
            Err(e) => tracing::warn!(error = %e, "rt: mlockall failed"),
        }
        imp::apply_scheduling(prio, cpu);
    });
}

#[cfg(unix)]
fn lock_memory(lock: RtLock) -> eyre::Result<()> {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};

    let flags = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => MCL_CURRENT,
        RtLock::All => MCL_CURRENT | MCL_FUTURE,
    };
    // SAFETY: mlockall only takes flags and affects this process.
    if unsafe { mlockall(flags) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    let retryable = matches!(err.raw_os_error(), Some(c) if c == libc::EPERM || c == libc::ENOMEM);
    if retryable && lock == RtLock::All {
        // fall back to what is resident now
        // SAFETY: as above.
        if unsafe { mlockall(MCL_CURRENT) } == 0 {
            tracing::warn!("rt: mlockall(current|future) refused; locked current pages only");
            return Ok(());
        }
    }
    if retryable {
        eyre::bail!("{err}; needs CAP_IPC_LOCK (or root) and a large enough 'ulimit -l'");
    }
    Err(err.into())
}

#[cfg(not(unix))]
fn lock_memory(_lock: RtLock) -> eyre::Result<()> {
    eyre::bail!("memory locking is not supported on this OS")
}

#[cfg(target_os = "linux")]
mod imp {
    use libc::{
        CPU_ISSET, CPU_SET, CPU_ZERO, SCHED_FIFO, cpu_set_t, sched_get_priority_max,
        sched_get_priority_min, sched_getaffinity, sched_param, sched_setaffinity,
        sched_setscheduler,
    };

    /// Capacity of `cpu_set_t` in CPU indices.
    const MAX_CPUSET_BITS: usize = std::mem::size_of::<cpu_set_t>() * 8;

    pub fn apply_scheduling(prio: Option<i32>, cpu: Option<usize>) {
        match set_fifo(prio) {
            Ok(p) => tracing::info!(prio = p, "rt: SCHED_FIFO applied"),
            Err(e) => tracing::warn!(error = %e, "rt: SCHED_FIFO not applied"),
        }
        let cpu = cpu.unwrap_or(0);
        match pin_to(cpu) {
            Ok(()) => tracing::info!(cpu, "rt: pinned"),
            Err(e) => tracing::warn!(error = %e, cpu, "rt: affinity not applied"),
        }
    }

    /// Requested priority clamped to the system range; max when unset.
    fn set_fifo(prio: Option<i32>) -> eyre::Result<i32> {
        // SAFETY: plain queries without pointers.
        let (min, max) = unsafe {
            (
                sched_get_priority_min(SCHED_FIFO),
                sched_get_priority_max(SCHED_FIFO),
            )
        };
        let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
        let p = prio.unwrap_or(max).clamp(min, max);
        let param = sched_param { sched_priority: p };
        // SAFETY: param outlives the call; pid 0 is this process.
        if unsafe { sched_setscheduler(0, SCHED_FIFO, &param) } != 0 {
            let err = std::io::Error::last_os_error();
            eyre::bail!("{err}; needs CAP_SYS_NICE or root");
        }
        Ok(p)
    }

    fn pin_to(cpu: usize) -> eyre::Result<()> {
        if cpu >= MAX_CPUSET_BITS {
            eyre::bail!("CPU {cpu} exceeds cpu_set_t capacity {MAX_CPUSET_BITS}");
        }
        let size = std::mem::size_of::<cpu_set_t>();
        // SAFETY: cpu_set_t is plain data; all-zero is a valid empty set and
        // the pointers passed below are valid for `size` bytes.
        unsafe {
            let mut allowed: cpu_set_t = std::mem::zeroed();
            if sched_getaffinity(0, size, &mut allowed) != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            if !CPU_ISSET(cpu, &allowed) {
                eyre::bail!("CPU {cpu} not permitted by current affinity mask");
            }
            let mut desired: cpu_set_t = std::mem::zeroed();
            CPU_ZERO(&mut desired);
            CPU_SET(cpu, &mut desired);
            if sched_setaffinity(0, size, &desired) != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
        }
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    pub fn apply_scheduling(prio: Option<i32>, cpu: Option<usize>) {
        tracing::warn!(?prio, ?cpu, "rt: SCHED_FIFO and affinity unavailable on this OS");
    }
}
