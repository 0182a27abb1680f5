//! Configuration resolution for cfmgr.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (`$XDG_CONFIG_HOME/cfmgr/settings.json` or an explicit path)
//! 3. Environment variables
//! 4. CLI arguments (applied by the caller, highest priority)
//!
//! The resolved [`ManagerConfig`] is handed to every component at construction;
//! nothing reads the environment after that.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TunnelError};

/// Default Cloudflare API base.
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Complete cfmgr configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Directory holding `<name>-config.yml` files, credential blobs and `pids/`.
    pub config_dir: PathBuf,
    /// Base domain tunnels are published under (`<name>.<base_domain>`).
    pub base_domain: Option<String>,
    /// Tunnel daemon binary, resolved through `PATH` when not absolute.
    pub daemon_bin: PathBuf,
    /// How long `start` waits after signalling a previous instance.
    pub restart_grace_ms: u64,
    /// Host written into the `http://host:port` ingress service.
    pub service_host: String,
    pub dns: DnsConfig,
    pub log_level: String,
}

/// Credentials for the DNS zone API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub api_token: Option<String>,
    pub zone_id: Option<String>,
    pub api_base: String,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            zone_id: None,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            base_domain: None,
            daemon_bin: PathBuf::from("cloudflared"),
            restart_grace_ms: 1000,
            service_host: "0.0.0.0".to_string(),
            dns: DnsConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl ManagerConfig {
    /// Configuration rooted at `config_dir` with every other field defaulted.
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            ..Self::default()
        }
    }

    /// Directory holding `<name>.pid` records.
    pub fn pid_dir(&self) -> PathBuf {
        self.config_dir.join("pids")
    }

    pub const fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }

    /// The configured base domain, or a config error when unset.
    pub fn require_base_domain(&self) -> Result<&str> {
        self.base_domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| TunnelError::Config("CF_DOMAIN (base domain) is not set".into()))
    }

    /// Create the config and PID directories if they do not exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.pid_dir())?;
        Ok(())
    }
}

/// `$HOME/.cloudflared`, where cloudflared keeps its credentials by default.
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".cloudflared")
}

/// Get the settings file path.
pub fn settings_path() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .map(|p| p.join("cfmgr").join("settings.json"))
}

/// Load configuration with hierarchical resolution.
///
/// `explicit` overrides the default settings file location; unlike the
/// default location it must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<ManagerConfig> {
    let mut config = match explicit {
        Some(path) => load_config_file(path)?,
        None => match settings_path() {
            Some(path) if path.exists() => load_config_file(&path)?,
            _ => ManagerConfig::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

fn load_config_file(path: &Path) -> Result<ManagerConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        TunnelError::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        TunnelError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn apply_env_overrides(config: &mut ManagerConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("CFMGR_CONFIG_DIR") {
        config.config_dir = PathBuf::from(val);
    }
    if let Some(val) = var("CF_DOMAIN") {
        config.base_domain = Some(val);
    }
    if let Some(val) = var("CFMGR_DAEMON_BIN") {
        config.daemon_bin = PathBuf::from(val);
    }
    if let Some(val) = var("CFMGR_RESTART_GRACE_MS") {
        if let Ok(n) = val.parse() {
            config.restart_grace_ms = n;
        }
    }
    if let Some(val) = var("CF_API_TOKEN") {
        config.dns.api_token = Some(val);
    }
    if let Some(val) = var("CF_ZONE_ID") {
        config.dns.zone_id = Some(val);
    }
    if let Some(val) = var("CFMGR_LOG_LEVEL") {
        config.log_level = val;
    }
}
