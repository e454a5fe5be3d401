use crate::app::ports::IndexServicePort;
use crate::error::Result;
use crate::wire::{IndexResponse, PacerSource};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// PACER index service over HTTP GET.
pub struct ReqwestIndexService {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestIndexService {
    /// `timeout` bounds each lookup; an expired lookup resolves no endpoint.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl IndexServicePort for ReqwestIndexService {
    async fn lookup(
        &self,
        organization_id: Option<&str>,
        provider_name: Option<&str>,
    ) -> Result<Option<PacerSource>> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(org) = organization_id.filter(|s| !s.is_empty()) {
            query.push(("organization-id", org));
        }
        if let Some(name) = provider_name.filter(|s| !s.is_empty()) {
            query.push(("provider-name", name));
        }

        let resp = self.client.get(&self.base_url).query(&query).send().await?;
        if resp.status() != reqwest::StatusCode::OK {
            info!(
                "Failed to access PACER Index Service at {} (status {})",
                self.base_url,
                resp.status().as_u16()
            );
            return Ok(None);
        }

        let body = resp.text().await?;
        let parsed: IndexResponse = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => {
                warn!("Undecodable PACER Index Service response: {}", e);
                return Ok(None);
            }
        };
        if parsed.count <= 0 {
            return Ok(None);
        }
        Ok(parsed.list.into_iter().next().and_then(|entry| entry.pacer_source))
    }
}
