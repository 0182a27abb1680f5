//! Wire types for the Cloudflare DNS records API.

use serde::{Deserialize, Serialize};

/// Envelope of every Cloudflare API v4 response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

impl<T> ApiResponse<T> {
    /// `"<code>: <message>"` pairs joined with `; `.
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "no error details".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A DNS record as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
}

/// Body of a record creation request.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRecord<'a> {
    #[serde(rename = "type")]
    pub record_type: &'a str,
    pub name: &'a str,
    pub content: &'a str,
    /// 1 means "automatic".
    pub ttl: u32,
    pub proxied: bool,
}

impl<'a> CreateRecord<'a> {
    pub const fn cname(name: &'a str, target: &'a str, proxied: bool) -> Self {
        Self {
            record_type: "CNAME",
            name,
            content: target,
            ttl: 1,
            proxied,
        }
    }
}
