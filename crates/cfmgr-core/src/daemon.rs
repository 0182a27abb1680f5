//! Invocation of the external tunnel daemon (`cloudflared`).
//!
//! Only three subcommands are used: `tunnel create`, `tunnel delete` and
//! `tunnel --config <path> run`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, TunnelError};

static TUNNEL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9a-f-]{36}").expect("static regex is valid"));

/// Name of the daemon-side tunnel backing the local tunnel `name`.
pub fn daemon_tunnel_name(name: &str) -> String {
    format!("{name}-tunnel")
}

/// Find the first UUID-shaped token in the daemon's output.
pub fn extract_tunnel_id(output: &str) -> Option<String> {
    TUNNEL_ID_RE
        .find_iter(output)
        .map(|m| m.as_str())
        .find(|candidate| uuid::Uuid::parse_str(candidate).is_ok())
        .map(str::to_owned)
}

/// Handle on the daemon binary.
#[derive(Debug, Clone)]
pub struct DaemonCli {
    bin: PathBuf,
}

impl DaemonCli {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    /// Run `tunnel create <name>-tunnel` to completion and return the new
    /// tunnel's UUID.
    pub async fn create_tunnel(&self, name: &str) -> Result<String> {
        let tunnel_name = daemon_tunnel_name(name);
        let output = self
            .output(&["tunnel", "create", &tunnel_name])
            .await
            .map_err(|e| TunnelError::Create(format!("{}: {e}", self.bin.display())))?;

        let combined = combined_output(&output);
        if !output.status.success() {
            return Err(TunnelError::Create(format!(
                "{} exited with {}, output: {}",
                self.bin.display(),
                output.status,
                combined.trim()
            )));
        }

        let id = extract_tunnel_id(&combined).ok_or_else(|| {
            TunnelError::Create(format!(
                "could not extract tunnel ID from output: {}",
                combined.trim()
            ))
        })?;
        info!(tunnel = %tunnel_name, id = %id, "daemon created tunnel");
        Ok(id)
    }

    /// Run `tunnel delete <name>-tunnel`.
    pub async fn delete_tunnel(&self, name: &str) -> Result<()> {
        let tunnel_name = daemon_tunnel_name(name);
        let output = self.output(&["tunnel", "delete", &tunnel_name]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(TunnelError::Io(std::io::Error::other(format!(
                "tunnel delete exited with {}: {}",
                output.status,
                combined_output(&output).trim()
            ))))
        }
    }

    /// Build `tunnel --config <path> run`, detached from our stdio and placed
    /// in its own process group.
    pub fn run_command(&self, config_path: &Path) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("tunnel")
            .arg("--config")
            .arg(config_path)
            .arg("run")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0);
        cmd
    }

    async fn output(&self, args: &[&str]) -> std::io::Result<std::process::Output> {
        debug!("exec: {} {}", self.bin.display(), args.join(" "));
        Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
    }
}

fn combined_output(output: &std::process::Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}
