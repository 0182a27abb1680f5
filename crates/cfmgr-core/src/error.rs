//! Error types for cfmgr tunnel management.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`TunnelError`].
pub type Result<T> = std::result::Result<T, TunnelError>;

/// Errors surfaced by the tunnel lifecycle operations.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// No config artifact exists for the tunnel.
    #[error("tunnel config not found: {name}")]
    NotFound { name: String },

    /// No live PID record exists for the tunnel.
    #[error("tunnel not running or PID file not found: {name}")]
    NotRunning { name: String },

    /// The daemon's create subcommand failed or its output had no tunnel ID.
    #[error("failed to create tunnel: {0}")]
    Create(String),

    /// The daemon could not be spawned or its PID could not be recorded.
    #[error("failed to start tunnel: {0}")]
    Launch(String),

    /// The termination signal could not be delivered.
    #[error("failed to stop tunnel: {0}")]
    Stop(String),

    /// A config artifact on disk is not valid YAML.
    #[error("failed to parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Caller-supplied input was rejected.
    #[error("validation error: {0}")]
    Validation(String),

    /// Required configuration is missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// DNS registration failed.
    #[error("DNS registration failed: {0}")]
    Dns(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    /// Whether the error means the referenced tunnel, config or PID record is absent.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NotRunning { .. })
    }
}
