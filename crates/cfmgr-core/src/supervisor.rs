//! Tunnel daemon lifecycle: start, stop and live inspection.
//!
//! The supervisor keeps no in-memory process state. A `<name>.pid` file
//! records the last daemon started for a tunnel, and every query probes the
//! process table to decide whether that PID is still alive. Records pointing
//! at dead processes are removed when they are next inspected.
//!
//! Operations on the same tunnel name are not serialized; concurrent
//! start/stop calls for one name race on the PID file.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::daemon::DaemonCli;
use crate::error::{Result, TunnelError};
use crate::process::ProcessTable;
use crate::store::ConfigStore;
use crate::tunnel::TunnelStatus;

const BYTES_PER_MB: f32 = 1024.0 * 1024.0;

/// Live process state of one tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessInfo {
    pub status: TunnelStatus,
    pub pid: Option<u32>,
    pub cpu: Option<f64>,
    /// Resident memory in MB.
    pub memory_mb: Option<f32>,
}

impl ProcessInfo {
    pub const fn stopped() -> Self {
        Self {
            status: TunnelStatus::Stopped,
            pid: None,
            cpu: None,
            memory_mb: None,
        }
    }
}

/// Contents of a PID record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PidRecord {
    Missing,
    Corrupt(String),
    Pid(u32),
}

/// Starts and stops tunnel daemons and reports on their liveness.
pub struct ProcessSupervisor {
    store: ConfigStore,
    daemon: DaemonCli,
    processes: Arc<dyn ProcessTable>,
    pid_dir: PathBuf,
    restart_grace: Duration,
}

impl ProcessSupervisor {
    pub fn new(config: &ManagerConfig, processes: Arc<dyn ProcessTable>) -> Self {
        Self {
            store: ConfigStore::new(&config.config_dir),
            daemon: DaemonCli::new(&config.daemon_bin),
            processes,
            pid_dir: config.pid_dir(),
            restart_grace: config.restart_grace(),
        }
    }

    /// `<config_dir>/pids/<name>.pid`
    pub fn pid_path(&self, name: &str) -> PathBuf {
        self.pid_dir.join(format!("{name}.pid"))
    }

    pub fn read_pid(&self, name: &str) -> PidRecord {
        match fs::read_to_string(self.pid_path(name)) {
            Ok(raw) => match raw.trim().parse::<u32>() {
                Ok(pid) if pid > 0 => PidRecord::Pid(pid),
                _ => PidRecord::Corrupt(raw),
            },
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(tunnel = name, error = %e, "failed to read PID record");
                }
                PidRecord::Missing
            }
        }
    }

    /// Delete the PID record. A missing record is not an error.
    pub fn clear_pid(&self, name: &str) {
        let path = self.pid_path(name);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove PID record");
            }
        }
    }

    /// Launch the daemon for `name` and record its PID.
    ///
    /// A previously recorded instance is sent SIGTERM and given the restart
    /// grace period to exit; its exit is not confirmed. If the PID record
    /// cannot be written the spawned daemon keeps running untracked.
    pub async fn start(&self, name: &str) -> Result<u32> {
        if !self.store.exists(name) {
            return Err(TunnelError::NotFound {
                name: name.to_string(),
            });
        }

        if let PidRecord::Pid(previous) = self.read_pid(name) {
            self.terminate_previous(name, previous).await;
        }

        let config_path = self.store.config_path(name);
        let child = self
            .daemon
            .run_command(&config_path)
            .spawn()
            .map_err(|e| TunnelError::Launch(format!("{}: {e}", self.daemon.bin().display())))?;
        let pid = child
            .id()
            .ok_or_else(|| TunnelError::Launch("daemon exited before its PID was read".into()))?;
        // Dropping the handle does not kill the daemon; the runtime reaps it
        // once it exits.
        drop(child);

        fs::create_dir_all(&self.pid_dir)
            .and_then(|()| fs::write(self.pid_path(name), pid.to_string()))
            .map_err(|e| TunnelError::Launch(format!("failed to save PID {pid}: {e}")))?;

        info!(tunnel = name, pid, config = %config_path.display(), "tunnel daemon started");
        Ok(pid)
    }

    async fn terminate_previous(&self, name: &str, pid: u32) {
        match self.processes.terminate(pid) {
            Ok(()) => {
                info!(tunnel = name, pid, "terminating previous daemon instance");
                tokio::time::sleep(self.restart_grace).await;
            }
            Err(e) => debug!(tunnel = name, pid, error = %e, "previous daemon instance already gone"),
        }
    }

    /// Send SIGTERM to the recorded daemon and remove its PID record.
    ///
    /// Returns as soon as the signal is delivered. A record whose process has
    /// already exited is removed and reported as [`TunnelError::NotRunning`]
    /// rather than a stop failure; any other signal error is
    /// [`TunnelError::Stop`] and leaves the record in place.
    pub fn stop(&self, name: &str) -> Result<()> {
        let pid = match self.read_pid(name) {
            PidRecord::Pid(pid) => pid,
            PidRecord::Missing => {
                return Err(TunnelError::NotRunning {
                    name: name.to_string(),
                });
            }
            PidRecord::Corrupt(raw) => {
                warn!(tunnel = name, contents = %raw.trim(), "removing corrupt PID record");
                self.clear_pid(name);
                return Err(TunnelError::NotRunning {
                    name: name.to_string(),
                });
            }
        };

        match self.processes.terminate(pid) {
            Ok(()) => {
                self.clear_pid(name);
                info!(tunnel = name, pid, "tunnel daemon signalled to stop");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                warn!(tunnel = name, pid, "daemon already exited, removing stale PID record");
                self.clear_pid(name);
                Err(TunnelError::NotRunning {
                    name: name.to_string(),
                })
            }
            Err(e) => Err(TunnelError::Stop(format!("failed to signal PID {pid}: {e}"))),
        }
    }

    /// Current process state of `name`, repairing stale PID records.
    pub fn inspect(&self, name: &str) -> ProcessInfo {
        let pid = match self.read_pid(name) {
            PidRecord::Missing => return ProcessInfo::stopped(),
            PidRecord::Corrupt(raw) => {
                warn!(tunnel = name, contents = %raw.trim(), "removing corrupt PID record");
                self.clear_pid(name);
                return ProcessInfo::stopped();
            }
            PidRecord::Pid(pid) => pid,
        };

        if !self.processes.exists(pid) {
            warn!(tunnel = name, pid, "daemon no longer running, removing stale PID record");
            self.clear_pid(name);
            return ProcessInfo::stopped();
        }

        #[allow(clippy::cast_precision_loss)]
        let memory_mb = self
            .processes
            .resident_memory(pid)
            .map(|bytes| bytes as f32 / BYTES_PER_MB);

        ProcessInfo {
            status: TunnelStatus::Running,
            pid: Some(pid),
            cpu: self.processes.cpu_percent(pid),
            memory_mb,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::process::OsProcessTable;
    use std::collections::HashMap;

    /// Process table with a fixed set of live PIDs.
    #[derive(Default)]
    struct FakeProcessTable {
        live: HashMap<u32, (Option<f64>, Option<u64>)>,
        /// Error returned by `terminate` for live PIDs.
        signal_error: Option<Errno>,
    }

    impl ProcessTable for FakeProcessTable {
        fn exists(&self, pid: u32) -> bool {
            self.live.contains_key(&pid)
        }

        fn cpu_percent(&self, pid: u32) -> Option<f64> {
            self.live.get(&pid)?.0
        }

        fn resident_memory(&self, pid: u32) -> Option<u64> {
            self.live.get(&pid)?.1
        }

        fn terminate(&self, pid: u32) -> std::result::Result<(), Errno> {
            if !self.live.contains_key(&pid) {
                return Err(Errno::ESRCH);
            }
            self.signal_error.map_or(Ok(()), Err)
        }
    }

    fn supervisor(
        dir: &tempfile::TempDir,
        processes: Arc<dyn ProcessTable>,
    ) -> (ManagerConfig, ProcessSupervisor) {
        let mut config = ManagerConfig::with_config_dir(dir.path());
        config.restart_grace_ms = 10;
        config.ensure_dirs().unwrap();
        let supervisor = ProcessSupervisor::new(&config, processes);
        (config, supervisor)
    }

    #[test]
    fn no_record_is_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let (_, sup) = supervisor(&dir, Arc::new(FakeProcessTable::default()));
        assert_eq!(sup.inspect("app"), ProcessInfo::stopped());
        assert_eq!(sup.read_pid("app"), PidRecord::Missing);
    }

    #[test]
    fn stale_record_is_removed_on_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let (_, sup) = supervisor(&dir, Arc::new(FakeProcessTable::default()));
        fs::write(sup.pid_path("app"), "4242").unwrap();

        let info = sup.inspect("app");
        assert_eq!(info.status, TunnelStatus::Stopped);
        assert!(info.pid.is_none());
        assert!(!sup.pid_path("app").exists());
    }

    #[test]
    fn corrupt_record_is_removed_on_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let (_, sup) = supervisor(&dir, Arc::new(FakeProcessTable::default()));
        fs::write(sup.pid_path("app"), "not-a-pid").unwrap();

        assert!(matches!(sup.read_pid("app"), PidRecord::Corrupt(_)));
        assert_eq!(sup.inspect("app").status, TunnelStatus::Stopped);
        assert!(!sup.pid_path("app").exists());
    }

    #[test]
    fn live_record_reports_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = FakeProcessTable::default();
        table.live.insert(4242, (Some(12.5), Some(64 * 1024 * 1024)));
        let (_, sup) = supervisor(&dir, Arc::new(table));
        fs::write(sup.pid_path("app"), "4242\n").unwrap();

        let info = sup.inspect("app");
        assert_eq!(info.status, TunnelStatus::Running);
        assert_eq!(info.pid, Some(4242));
        assert_eq!(info.cpu, Some(12.5));
        assert_eq!(info.memory_mb, Some(64.0));
        assert!(sup.pid_path("app").exists());
    }

    #[test]
    fn metric_sampling_failure_keeps_running_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = FakeProcessTable::default();
        table.live.insert(7, (None, None));
        let (_, sup) = supervisor(&dir, Arc::new(table));
        fs::write(sup.pid_path("app"), "7").unwrap();

        let info = sup.inspect("app");
        assert_eq!(info.status, TunnelStatus::Running);
        assert!(info.cpu.is_none());
        assert!(info.memory_mb.is_none());
    }

    #[test]
    fn stop_without_record_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let (_, sup) = supervisor(&dir, Arc::new(OsProcessTable));
        let err = sup.stop("app").unwrap_err();
        assert!(matches!(err, TunnelError::NotRunning { .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn stop_signal_failure_is_stop_error_and_keeps_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = FakeProcessTable {
            signal_error: Some(Errno::EPERM),
            ..FakeProcessTable::default()
        };
        table.live.insert(4242, (None, None));
        let (_, sup) = supervisor(&dir, Arc::new(table));
        fs::write(sup.pid_path("app"), "4242").unwrap();

        let err = sup.stop("app").unwrap_err();
        assert!(matches!(err, TunnelError::Stop(_)));
        assert!(!err.is_not_found());
        assert_eq!(sup.read_pid("app"), PidRecord::Pid(4242));
    }

    #[test]
    fn stop_of_vanished_process_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let (_, sup) = supervisor(&dir, Arc::new(FakeProcessTable::default()));
        fs::write(sup.pid_path("app"), "4242").unwrap();

        let err = sup.stop("app").unwrap_err();
        assert!(matches!(err, TunnelError::NotRunning { .. }));
        assert_eq!(sup.read_pid("app"), PidRecord::Missing);
    }

    #[test]
    fn stop_live_fake_process_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = FakeProcessTable::default();
        table.live.insert(4242, (None, None));
        let (_, sup) = supervisor(&dir, Arc::new(table));
        fs::write(sup.pid_path("app"), "4242").unwrap();

        sup.stop("app").unwrap();
        assert_eq!(sup.read_pid("app"), PidRecord::Missing);
    }

    #[test]
    fn stop_signals_live_process_and_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let (_, sup) = supervisor(&dir, Arc::new(OsProcessTable));
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        fs::write(sup.pid_path("app"), child.id().to_string()).unwrap();

        sup.stop("app").unwrap();
        assert!(!sup.pid_path("app").exists());

        let status = child.wait().unwrap();
        assert!(!status.success());
        assert_eq!(sup.inspect("app").status, TunnelStatus::Stopped);
    }

    #[test]
    fn stop_of_exited_process_repairs_record() {
        let dir = tempfile::tempdir().unwrap();
        let (_, sup) = supervisor(&dir, Arc::new(OsProcessTable));
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        fs::write(sup.pid_path("app"), pid.to_string()).unwrap();

        let err = sup.stop("app").unwrap_err();
        assert!(matches!(err, TunnelError::NotRunning { .. }));
        assert!(!sup.pid_path("app").exists());
    }

    #[tokio::test]
    async fn start_without_config_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (_, sup) = supervisor(&dir, Arc::new(OsProcessTable));
        let err = sup.start("ghost").await.unwrap_err();
        assert!(matches!(err, TunnelError::NotFound { .. }));
        assert!(!sup.pid_path("ghost").exists());
    }

    #[tokio::test]
    async fn start_with_missing_binary_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ManagerConfig::with_config_dir(dir.path());
        config.daemon_bin = PathBuf::from("/nonexistent/cloudflared");
        config.ensure_dirs().unwrap();
        ConfigStore::new(dir.path())
            .write_raw("app", "tunnel: x\n")
            .unwrap();
        let sup = ProcessSupervisor::new(&config, Arc::new(OsProcessTable));

        let err = sup.start("app").await.unwrap_err();
        assert!(matches!(err, TunnelError::Launch(_)));
        assert_eq!(sup.read_pid("app"), PidRecord::Missing);
    }
}
