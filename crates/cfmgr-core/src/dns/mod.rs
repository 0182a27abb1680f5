//! DNS registration for tunnel hostnames.
//!
//! Tunnel creation asks a [`DnsRegistrar`] to point the tunnel's hostname at
//! the daemon-assigned edge endpoint. Registration is best-effort: the
//! service logs failures and keeps the tunnel.

mod cloudflare;
pub mod types;


use async_trait::async_trait;

use crate::error::Result;

pub use cloudflare::CloudflareDns;

/// Suffix of the edge hostname assigned to every Cloudflare tunnel.
pub const TUNNEL_EDGE_SUFFIX: &str = "cfargotunnel.com";

/// `<tunnel_id>.cfargotunnel.com`
pub fn tunnel_dns_target(tunnel_id: &str) -> String {
    format!("{tunnel_id}.{TUNNEL_EDGE_SUFFIX}")
}

/// Creates DNS records pointing hostnames at tunnel endpoints.
#[async_trait]
pub trait DnsRegistrar: Send + Sync {
    /// Ensure a record for `hostname` pointing at `target` exists.
    async fn create_record(&self, hostname: &str, target: &str, proxied: bool) -> Result<()>;
}
