//! cfmgr CLI
//!
//! Creates, runs and inspects Cloudflare tunnels backed by `cloudflared`.
//! Tunnel data is printed as JSON on stdout; logs go to stderr.

mod tunnel_cmd;

use std::io;
use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use cfmgr_core::TunnelService;
use cfmgr_core::config::load_config;
use cfmgr_core::tracing_init::init_tracing;

use crate::tunnel_cmd::TunnelCommand;

#[derive(Parser, Debug)]
#[command(name = "cfmgr")]
#[command(version, about = "Cloudflare tunnel manager", long_about = None)]
struct Cli {
    /// Settings file (defaults to $XDG_CONFIG_HOME/cfmgr/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding tunnel configs, credentials and PID records
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Base domain tunnels are published under
    #[arg(long, global = true)]
    domain: Option<String>,

    /// Tunnel daemon binary
    #[arg(long, global = true)]
    daemon_bin: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: TunnelCommand,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(dir) = cli.config_dir {
        config.config_dir = dir;
    }
    if let Some(domain) = cli.domain {
        config.base_domain = Some(domain);
    }
    if let Some(bin) = cli.daemon_bin {
        config.daemon_bin = bin;
    }

    init_tracing(&config.log_level, cli.log_json);
    debug!(config_dir = %config.config_dir.display(), "configuration resolved");

    config.ensure_dirs()?;
    let service = TunnelService::new(config);
    tunnel_cmd::run(cli.command, &service, &mut io::stdout()).await
}
