//! Out-of-band process inspection.
//!
//! The supervisor never holds a handle to a running daemon; it only knows a
//! PID and asks the [`ProcessTable`] about it.

mod os;

use nix::errno::Errno;

pub use os::OsProcessTable;

/// Liveness and resource queries against the OS process table.
pub trait ProcessTable: Send + Sync {
    /// Whether a live (non-zombie) process with this PID exists.
    fn exists(&self, pid: u32) -> bool;

    /// Lifetime-average CPU usage in percent of one core.
    fn cpu_percent(&self, pid: u32) -> Option<f64>;

    /// Resident set size in bytes.
    fn resident_memory(&self, pid: u32) -> Option<u64>;

    /// Send SIGTERM. `ESRCH` means the process is already gone.
    fn terminate(&self, pid: u32) -> Result<(), Errno>;
}
