use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use super::ProcessTable;

/// [`ProcessTable`] backed by `kill(2)` probes and, on Linux, `/proc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessTable;

/// Convert a recorded PID into a signalable one. Rejects 0 and values above
/// `i32::MAX`, which `kill(2)` would interpret as process groups.
fn nix_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .map(Pid::from_raw)
}

impl ProcessTable for OsProcessTable {
    fn exists(&self, pid: u32) -> bool {
        let Some(target) = nix_pid(pid) else {
            return false;
        };
        // Signal 0 only checks for existence. EPERM means the process exists
        // but belongs to another user.
        match kill(target, None) {
            Ok(()) | Err(Errno::EPERM) => !sys::is_zombie(target),
            Err(_) => false,
        }
    }

    fn cpu_percent(&self, pid: u32) -> Option<f64> {
        sys::cpu_percent(nix_pid(pid)?)
    }

    fn resident_memory(&self, pid: u32) -> Option<u64> {
        sys::resident_memory(nix_pid(pid)?)
    }

    fn terminate(&self, pid: u32) -> Result<(), Errno> {
        kill(nix_pid(pid).ok_or(Errno::EINVAL)?, Signal::SIGTERM)
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use std::time::{SystemTime, UNIX_EPOCH};

    use nix::unistd::Pid;
    use procfs::process::Process;

    pub fn is_zombie(pid: Pid) -> bool {
        Process::new(pid.as_raw())
            .and_then(|p| p.stat())
            .is_ok_and(|stat| stat.state == 'Z')
    }

    /// Total CPU time over wall time since the process started.
    #[allow(clippy::cast_precision_loss)]
    pub fn cpu_percent(pid: Pid) -> Option<f64> {
        let stat = Process::new(pid.as_raw()).ok()?.stat().ok()?;
        let ticks = procfs::ticks_per_second() as f64;
        let boot = procfs::boot_time_secs().ok()? as f64;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs_f64();

        let started = boot + stat.starttime as f64 / ticks;
        let elapsed = now - started;
        if elapsed <= 0.0 {
            return Some(0.0);
        }
        let cpu_secs = (stat.utime + stat.stime) as f64 / ticks;
        Some(100.0 * cpu_secs / elapsed)
    }

    pub fn resident_memory(pid: Pid) -> Option<u64> {
        let status = Process::new(pid.as_raw()).ok()?.status().ok()?;
        status.vmrss.map(|kb| kb * 1024)
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use nix::unistd::Pid;

    pub const fn is_zombie(_pid: Pid) -> bool {
        false
    }

    pub const fn cpu_percent(_pid: Pid) -> Option<f64> {
        None
    }

    pub const fn resident_memory(_pid: Pid) -> Option<u64> {
        None
    }
}
