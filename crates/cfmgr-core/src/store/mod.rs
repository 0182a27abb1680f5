//! On-disk tunnel configuration.
//!
//! Each tunnel is one `<name>-config.yml` file in the config directory. The
//! directory listing is the only record of which tunnels exist.

mod artifact;

pub use artifact::{
    CATCH_ALL_SERVICE, ConfigArtifact, IngressRule, TunnelRecord, http_service, service_port,
};

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, TunnelError};

/// Suffix that marks a file in the config directory as a tunnel config.
pub const CONFIG_SUFFIX: &str = "-config.yml";

/// Reads and writes per-tunnel YAML config artifacts.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// `<config_dir>/<name>-config.yml`
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir.join(format!("{name}{CONFIG_SUFFIX}"))
    }

    /// `<config_dir>/<tunnel_id>.json`, where the daemon writes tunnel credentials.
    pub fn credentials_path(&self, tunnel_id: &str) -> PathBuf {
        self.config_dir.join(format!("{tunnel_id}.json"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.config_path(name).is_file()
    }

    /// Serialize and write the artifact, replacing any existing file.
    pub fn write(&self, name: &str, artifact: &ConfigArtifact) -> Result<()> {
        let yaml = serde_yaml::to_string(artifact).map_err(std::io::Error::other)?;
        self.write_raw(name, &yaml)
    }

    /// Strictly decode the artifact.
    pub fn read(&self, name: &str) -> Result<ConfigArtifact> {
        let path = self.config_path(name);
        let text = self.read_raw(name)?;
        serde_yaml::from_str(&text).map_err(|source| TunnelError::ConfigParse { path, source })
    }

    /// Leniently recover routing metadata; only fails if the file is missing
    /// or not YAML.
    pub fn read_record(&self, name: &str) -> Result<TunnelRecord> {
        let path = self.config_path(name);
        let text = self.read_raw(name)?;
        TunnelRecord::from_yaml(&text).map_err(|source| TunnelError::ConfigParse { path, source })
    }

    pub fn read_raw(&self, name: &str) -> Result<String> {
        fs::read_to_string(self.config_path(name)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TunnelError::NotFound {
                name: name.to_string(),
            },
            _ => TunnelError::Io(e),
        })
    }

    pub fn write_raw(&self, name: &str, content: &str) -> Result<()> {
        let path = self.config_path(name);
        fs::create_dir_all(&self.config_dir)?;
        fs::write(&path, content)?;
        debug!(path = %path.display(), "wrote tunnel config");
        Ok(())
    }

    /// Names of all tunnels with a config file, sorted.
    ///
    /// An unreadable or missing directory yields an empty list.
    pub fn list_names(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.config_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.config_dir.display(), error = %e, "config dir unreadable");
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let file_name = entry.file_name().into_string().ok()?;
                let name = file_name.strip_suffix(CONFIG_SUFFIX)?;
                (!name.is_empty()).then(|| name.to_string())
            })
            .collect();
        names.sort();
        names
    }

    /// Delete the config file. A missing file is not an error.
    pub fn remove(&self, name: &str) {
        let path = self.config_path(name);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove tunnel config");
            }
        }
    }
}
