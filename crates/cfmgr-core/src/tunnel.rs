//! The derived tunnel model.
//!
//! A [`Tunnel`] is never stored; it is rebuilt from the config artifact and
//! the live process table on every query.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TunnelError};

/// Live state of a tunnel's daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TunnelStatus {
    #[default]
    Stopped,
    Running,
}

impl TunnelStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }
}

impl std::fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tunnel as reported by the control API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tunnel {
    pub name: String,
    /// Daemon-assigned tunnel UUID; empty if the artifact lacks one.
    pub id: String,
    /// Local port traffic is forwarded to; 0 if it could not be parsed.
    pub port: u16,
    pub domain: String,
    pub status: TunnelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    /// Resident memory in MB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<f32>,
    /// Seconds since the Unix epoch. Only known to the call that created the tunnel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

/// Counts of tunnels by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TunnelSummary {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
}

impl TunnelSummary {
    pub fn from_tunnels(tunnels: &[Tunnel]) -> Self {
        let running = tunnels
            .iter()
            .filter(|t| t.status == TunnelStatus::Running)
            .count();
        Self {
            total: tunnels.len(),
            running,
            stopped: tunnels.len() - running,
        }
    }
}

/// Reject names that cannot safely be used as a file stem.
///
/// Allowed: ASCII alphanumerics, `-`, `_` and `.`, so dotted subdomains such
/// as `api.v2` work. A name made only of dots is rejected.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TunnelError::Validation("tunnel name is empty".into()));
    }
    if name.chars().all(|c| c == '.') {
        return Err(TunnelError::Validation(format!(
            "tunnel name {name:?} is not a valid name"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(TunnelError::Validation(format!(
            "tunnel name {name:?} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}
