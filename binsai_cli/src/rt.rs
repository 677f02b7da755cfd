//! Real-time scheduling helpers (Linux SCHED_FIFO + mlockall; macOS mlockall).
//!
//! The only timing-sensitive work in the loop is the ultrasonic echo
//! measurement; everything else tolerates jitter.

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn lock_memory() -> eyre::Result<()> {
    let rc = unsafe { libc::mlockall(libc::MCL_CURRENT) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    let mut msg = format!("mlockall(current) failed: {err}");
    if matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM) {
        msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'");
    }
    Err(eyre::eyre!(msg))
}

#[cfg(target_os = "linux")]
fn fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param};

    let (min, max) = unsafe {
        let min = sched_get_priority_min(SCHED_FIFO);
        let max = sched_get_priority_max(SCHED_FIFO);
        if min < 0 || max < 0 { (1, 99) } else { (min, max) }
    };
    // Leave headroom above us for kernel threads unless asked otherwise.
    let wanted = prio.unwrap_or(min + (max - min) / 2).clamp(min, max);
    let param = sched_param {
        sched_priority: wanted,
    };
    let rc = unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        eyre::bail!(
            "sched_setscheduler(SCHED_FIFO, {wanted}) failed: {err}; needs CAP_SYS_NICE or root \
             (e.g. 'sudo setcap cap_sys_nice=ep /path/to/binsai')"
        );
    }
    Ok(wanted)
}

/// Apply real-time settings once per process. Failures are logged, never fatal.
pub fn setup_rt_once(rt: bool, prio: Option<i32>) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }
    RT_ONCE.get_or_init(|| {
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        match lock_memory() {
            Ok(()) => tracing::info!("RT: memory lock = current"),
            Err(err) => tracing::warn!(%err, "RT: memory not locked"),
        }
        #[cfg(target_os = "linux")]
        match fifo_priority(prio) {
            Ok(p) => tracing::info!(prio = p, "RT: SCHED_FIFO enabled"),
            Err(err) => tracing::warn!(%err, "RT: scheduling unchanged"),
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = prio;
            tracing::warn!("RT: SCHED_FIFO is only available on Linux");
        }
    });
}
