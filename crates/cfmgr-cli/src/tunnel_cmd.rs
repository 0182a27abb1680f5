//! Tunnel subcommands.
//!
//! User-facing output uses writeln! to the given writer (stdout in the binary).

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use cfmgr_core::TunnelService;

/// Top-level commands.
#[derive(clap::Subcommand, Debug)]
pub enum TunnelCommand {
    /// Create a tunnel forwarding <subdomain>.<domain> to a local port.
    Create {
        /// Tunnel name and subdomain (random if omitted).
        #[arg(long)]
        subdomain: Option<String>,
        /// Local port to forward to.
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,
    },
    /// List all tunnels with their live status.
    List,
    /// Show one tunnel.
    Status {
        name: String,
    },
    /// Start the tunnel daemon.
    Start {
        name: String,
    },
    /// Stop the tunnel daemon.
    Stop {
        name: String,
    },
    /// Stop and remove a tunnel.
    Delete {
        name: String,
    },
    /// Read or replace a tunnel's raw YAML config.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Count tunnels by status.
    Summary,
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the config file.
    Get { name: String },
    /// Replace the config file with the contents of --file or stdin.
    Set {
        name: String,
        /// Read the new config from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

/// Execute a tunnel command, writing its output to `out`.
pub async fn run(
    command: TunnelCommand,
    service: &TunnelService,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        TunnelCommand::Create { subdomain, port } => {
            let tunnel = service.create(subdomain.as_deref(), port).await?;
            print_json(out, &tunnel)
        }
        TunnelCommand::List => print_json(out, &service.list()),
        TunnelCommand::Status { name } => print_json(out, &service.get(&name)?),
        TunnelCommand::Start { name } => {
            let pid = service.start(&name).await?;
            writeln!(out, "Started tunnel {name} (pid {pid})")?;
            Ok(())
        }
        TunnelCommand::Stop { name } => {
            service.stop(&name)?;
            writeln!(out, "Stopped tunnel {name}")?;
            Ok(())
        }
        TunnelCommand::Delete { name } => {
            service.delete(&name).await?;
            writeln!(out, "Deleted tunnel {name}")?;
            Ok(())
        }
        TunnelCommand::Config { action } => config(action, service, out),
        TunnelCommand::Summary => print_json(out, &service.summary()),
    }
}

fn config(action: ConfigAction, service: &TunnelService, out: &mut impl Write) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { name } => {
            out.write_all(service.get_config(&name)?.as_bytes())?;
            Ok(())
        }
        ConfigAction::Set { name, file } => {
            let raw = read_input(file.as_deref())?;
            service.set_config(&name, &raw)?;
            writeln!(out, "Updated config for tunnel {name}")?;
            Ok(())
        }
    }
}

fn read_input(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut raw = String::new();
            io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read config from stdin")?;
            Ok(raw)
        }
    }
}

fn print_json(out: &mut impl Write, value: &impl serde::Serialize) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
