//! Cloudflare API v4 DNS client.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::DnsRegistrar;
use super::types::{ApiResponse, CreateRecord, DnsRecord};
use crate::config::DnsConfig;
use crate::error::{Result, TunnelError};

/// DNS registrar for a single Cloudflare zone.
#[derive(Debug)]
pub struct CloudflareDns {
    http: reqwest::Client,
    api_base: String,
    zone_id: String,
}

fn http_error(e: &reqwest::Error) -> TunnelError {
    TunnelError::Dns(format!("HTTP request failed: {e}"))
}

impl CloudflareDns {
    /// Create a client. Fails with a config error if the token or zone ID is
    /// missing.
    pub fn new(config: &DnsConfig) -> Result<Self> {
        let token = config
            .api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TunnelError::Config("CF_API_TOKEN is not set".into()))?;
        let zone_id = config
            .zone_id
            .as_deref()
            .filter(|z| !z.is_empty())
            .ok_or_else(|| TunnelError::Config("CF_ZONE_ID is not set".into()))?;

        let mut headers = HeaderMap::new();
        let token_val = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| TunnelError::Config("Invalid API token format".into()))?;
        headers.insert(AUTHORIZATION, token_val);

        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| http_error(&e))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            zone_id: zone_id.to_string(),
        })
    }

    /// `<api_base>/zones/<zone_id>/dns_records`
    pub(crate) fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.api_base, self.zone_id)
    }

    /// Look up an existing record by exact name.
    pub async fn find_record(&self, hostname: &str) -> Result<Option<DnsRecord>> {
        let resp = self
            .http
            .get(self.records_url())
            .query(&[("name", hostname)])
            .send()
            .await
            .map_err(|e| http_error(&e))?;
        let records: Vec<DnsRecord> = Self::parse(resp).await?.unwrap_or_default();
        Ok(records.into_iter().find(|r| r.name == hostname))
    }

    async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Option<T>> {
        let status = resp.status();
        let body: ApiResponse<T> = match resp.json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => return Err(http_error(&e)),
            Err(_) => {
                return Err(TunnelError::Dns(format!(
                    "API error ({status}): {}",
                    status.canonical_reason().unwrap_or("Unknown")
                )));
            }
        };
        if !status.is_success() || !body.success {
            return Err(TunnelError::Dns(format!(
                "API error ({status}): {}",
                body.error_summary()
            )));
        }
        Ok(body.result)
    }
}

#[async_trait]
impl DnsRegistrar for CloudflareDns {
    /// Creates a CNAME unless a record with this name already exists.
    async fn create_record(&self, hostname: &str, target: &str, proxied: bool) -> Result<()> {
        if let Some(existing) = self.find_record(hostname).await? {
            debug!(
                hostname,
                record_id = %existing.id,
                content = %existing.content,
                "DNS record already exists"
            );
            return Ok(());
        }

        let resp = self
            .http
            .post(self.records_url())
            .json(&CreateRecord::cname(hostname, target, proxied))
            .send()
            .await
            .map_err(|e| http_error(&e))?;
        let record: Option<DnsRecord> = Self::parse(resp).await?;

        info!(
            hostname,
            target,
            record_id = record.as_ref().map_or("", |r| r.id.as_str()),
            "DNS record created"
        );
        Ok(())
    }
}
