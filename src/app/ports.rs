use crate::error::Result;
use crate::wire::{JobRequest, PacerResponse, PacerSource};
use async_trait::async_trait;

/// Outbound job submission to a PACER endpoint.
///
/// Any HTTP status comes back as `Ok`; only failures to send the request or
/// read its body are errors.
#[async_trait]
pub trait PacerClientPort: Send + Sync {
    async fn submit(
        &self,
        endpoint: &str,
        auth_header: Option<&str>,
        request: &JobRequest,
    ) -> Result<PacerResponse>;
}

/// Lookup of a provider's PACER source in the index service.
#[async_trait]
pub trait IndexServicePort: Send + Sync {
    async fn lookup(
        &self,
        organization_id: Option<&str>,
        provider_name: Option<&str>,
    ) -> Result<Option<PacerSource>>;
}
