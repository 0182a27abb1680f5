//! cfmgr Core Library
//!
//! Lifecycle management for Cloudflare tunnels driven through `cloudflared`:
//! - Per-tunnel YAML config artifacts kept in a config directory
//! - Daemon supervision through PID records and live process probing
//! - Best-effort DNS registration of tunnel hostnames
//! - Configuration resolution and shared tracing setup

pub mod config;
pub mod daemon;
pub mod dns;
pub mod error;
pub mod names;
pub mod process;
pub mod service;
pub mod store;
pub mod supervisor;
pub mod tracing_init;
pub mod tunnel;

pub use config::ManagerConfig;
pub use error::{Result, TunnelError};
pub use service::TunnelService;
pub use tunnel::{Tunnel, TunnelStatus, TunnelSummary};
