//! Real-time scheduling helpers (Linux SCHED_FIFO / affinity / mlockall).
//!
//! The acquisition loop runs on a 333 us tick; a page fault or a preemption
//! by a batch task costs whole mains cycles. All failures here degrade to
//! warnings: the diverter still works without privileges, just with more
//! jitter.

use crate::cli::RtLock;

#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>, lock: RtLock, rt_cpu: Option<usize>) {
    use libc::{
        CPU_SET, CPU_ZERO, SCHED_FIFO, sched_get_priority_max, sched_get_priority_min,
        sched_param, sched_setscheduler,
    };
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }

    fn apply_mem_lock(lock: RtLock) -> std::io::Result<()> {
        use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};
        let flags = match lock {
            RtLock::None => return Ok(()),
            RtLock::Current => MCL_CURRENT,
            RtLock::All => MCL_CURRENT | MCL_FUTURE,
        };
        if unsafe { mlockall(flags) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    fn apply_fifo_priority(prio: Option<i32>) -> std::io::Result<i32> {
        let (min, max) = unsafe {
            let min = sched_get_priority_min(SCHED_FIFO);
            let max = sched_get_priority_max(SCHED_FIFO);
            if min < 0 || max < 0 { (1, 99) } else { (min, max) }
        };
        let prio_val = prio.unwrap_or(max).clamp(min, max);
        let param = sched_param {
            sched_priority: prio_val,
        };
        if unsafe { sched_setscheduler(0, SCHED_FIFO, &param) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(prio_val)
    }

    fn apply_affinity(rt_cpu: Option<usize>) -> std::io::Result<usize> {
        let target = rt_cpu.unwrap_or(0);
        let max_bits = std::mem::size_of::<libc::cpu_set_t>() * 8;
        if target >= max_bits {
            return Err(std::io::Error::other(format!(
                "cpu {target} exceeds cpu_set_t capacity {max_bits}"
            )));
        }
        let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        unsafe {
            CPU_ZERO(&mut set);
            CPU_SET(target, &mut set);
        }
        if unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) } != 0
        {
            return Err(std::io::Error::last_os_error());
        }
        Ok(target)
    }

    RT_ONCE.get_or_init(|| {
        match apply_mem_lock(lock) {
            Ok(()) => tracing::info!(?lock, "memory lock applied"),
            Err(err) => tracing::warn!(
                %err,
                "mlockall failed; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'"
            ),
        }
        match apply_fifo_priority(prio) {
            Ok(prio_val) => tracing::info!(prio = prio_val, "SCHED_FIFO applied"),
            Err(err) => tracing::warn!(
                %err,
                "sched_setscheduler(SCHED_FIFO) failed; hint: needs CAP_SYS_NICE or root"
            ),
        }
        match apply_affinity(rt_cpu) {
            Ok(cpu) => tracing::info!(cpu, "pinned to CPU"),
            Err(err) => tracing::warn!(%err, "affinity not applied"),
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>, lock: RtLock, _rt_cpu: Option<usize>) {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();
    if !rt {
        return;
    }
    RT_ONCE.get_or_init(|| {
        let flags = match lock {
            RtLock::None => None,
            RtLock::Current => Some(MCL_CURRENT),
            RtLock::All => Some(MCL_CURRENT | MCL_FUTURE),
        };
        if let Some(flags) = flags {
            if unsafe { mlockall(flags) } != 0 {
                let err = std::io::Error::last_os_error();
                tracing::warn!(%err, "mlockall failed");
            } else {
                tracing::info!(?lock, "memory lock applied");
            }
        }
        tracing::warn!("SCHED_FIFO and affinity are Linux-only; only mlockall applied");
    });
}
