use crate::app::ports::PacerClientPort;
use crate::error::{Result, SyncError};
use crate::wire::{JobRequest, PacerResponse};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct ReqwestPacerClient {
    client: reqwest::Client,
}

impl ReqwestPacerClient {
    pub fn new(timeout: Duration, trust_cert: bool) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout);
        if trust_cert {
            warn!("ALL CERTIFICATES WILL BE TRUSTED WITHOUT HOSTNAME VERIFICATION.");
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

fn transport(endpoint: &str, e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Transport(format!("request to {} timed out: {}", endpoint, e))
    } else {
        SyncError::Transport(e.to_string())
    }
}

#[async_trait]
impl PacerClientPort for ReqwestPacerClient {
    async fn submit(
        &self,
        endpoint: &str,
        auth_header: Option<&str>,
        request: &JobRequest,
    ) -> Result<PacerResponse> {
        info!(
            "Posting to {} with {} list element(s) as job {}",
            endpoint,
            request.list_elements.len(),
            request.name
        );
        debug!("payload: {}", serde_json::to_string_pretty(request)?);

        let mut req = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(request);
        if let Some(auth) = auth_header.filter(|a| !a.is_empty()) {
            req = req.header(AUTHORIZATION, auth);
        }

        let resp = req.send().await.map_err(|e| transport(endpoint, e))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| transport(endpoint, e))?;
        debug!("received status {} from {}: {}", status, endpoint, body);
        Ok(PacerResponse { status, body })
    }
}
