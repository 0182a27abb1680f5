//! Typed config artifact and lenient reconstruction of tunnel metadata.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Service of the mandatory terminal ingress rule.
pub const CATCH_ALL_SERVICE: &str = "http_status:404";

static SERVICE_PORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^/\s]+:(\d+)(?:/.*)?$").expect("static regex is valid")
});

/// The YAML document instructing the daemon how to route one tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigArtifact {
    /// Tunnel UUID.
    pub tunnel: String,
    pub credentials_file: PathBuf,
    pub ingress: Vec<IngressRule>,
}

/// One hostname -> service forwarding entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icmp: Option<bool>,
    pub service: String,
}

impl ConfigArtifact {
    /// A single `hostname -> service` rule followed by the 404 catch-all.
    pub fn new(
        tunnel_id: impl Into<String>,
        credentials_file: impl Into<PathBuf>,
        hostname: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            tunnel: tunnel_id.into(),
            credentials_file: credentials_file.into(),
            ingress: vec![
                IngressRule {
                    hostname: Some(hostname.into()),
                    icmp: Some(false),
                    service: service.into(),
                },
                IngressRule {
                    hostname: None,
                    icmp: None,
                    service: CATCH_ALL_SERVICE.to_string(),
                },
            ],
        }
    }
}

/// Format the ingress service for a local port.
pub fn http_service(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

/// Port of an `http://host:port` service, if it has one.
pub fn service_port(service: &str) -> Option<u16> {
    SERVICE_PORT_RE
        .captures(service.trim())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Routing metadata recovered from a possibly hand-edited artifact.
///
/// Every field is independently optional: a missing or malformed key leaves
/// that field unset instead of failing the whole record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelRecord {
    pub id: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
}

impl TunnelRecord {
    /// Fails only if `text` is not YAML at all.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        let doc: Value = serde_yaml::from_str(text)?;
        Ok(Self::from_value(&doc))
    }

    pub fn from_value(doc: &Value) -> Self {
        let id = doc
            .get("tunnel")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let rules: Vec<(&str, Option<u16>)> = doc
            .get("ingress")
            .and_then(Value::as_sequence)
            .into_iter()
            .flatten()
            .filter_map(|rule| {
                let hostname = rule.get("hostname")?.as_str()?;
                let port = rule
                    .get("service")
                    .and_then(Value::as_str)
                    .and_then(service_port);
                Some((hostname, port))
            })
            .collect();

        // First hostname rule with a parseable port wins; otherwise keep the
        // first hostname so the domain is still reported.
        let chosen = rules
            .iter()
            .find(|(_, port)| port.is_some())
            .or_else(|| rules.first());

        Self {
            id,
            hostname: chosen.map(|(h, _)| (*h).to_owned()),
            port: chosen.and_then(|(_, p)| *p),
        }
    }
}
