use crate::app::ports::IndexServicePort;
use crate::constants::JOB_TYPE_ECR;
use crate::domain::identifier;
use crate::domain::Provider;
use crate::wire::PacerSource;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use tracing::{info, warn};

/// Where to submit jobs for a record, and how to authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedEndpoint {
    pub server_url: String,
    pub auth_header: Option<String>,
}

/// `Basic base64(user:pass)`.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

/// Turns an index service entry into an endpoint, if it is a usable ECR source.
pub fn endpoint_from_source(source: &PacerSource) -> Option<ResolvedEndpoint> {
    if !source.source_type.eq_ignore_ascii_case(JOB_TYPE_ECR) {
        return None;
    }
    if source.server_url.trim().is_empty() {
        return None;
    }
    let auth_header = source
        .security
        .as_ref()
        .filter(|s| s.security_type.eq_ignore_ascii_case("basic"))
        .map(|s| basic_auth_header(&s.username, &s.password));
    Some(ResolvedEndpoint {
        server_url: source.server_url.trim().to_string(),
        auth_header,
    })
}

/// Maps provider identities to PACER job endpoints through the index service.
pub struct EndpointResolver {
    index: Arc<dyn IndexServicePort>,
}

impl EndpointResolver {
    pub fn new(index: Arc<dyn IndexServicePort>) -> Self {
        Self { index }
    }

    pub async fn resolve_provider(&self, provider: &Provider) -> Option<ResolvedEndpoint> {
        let org_id = identifier::encode_id(&provider.id);
        let name = provider.name.trim();
        let org = (!org_id.is_empty()).then_some(org_id.as_str());
        let name = (!name.is_empty()).then_some(name);
        if org.is_none() && name.is_none() {
            return None;
        }

        match self.index.lookup(org, name).await {
            Ok(Some(source)) => {
                let endpoint = endpoint_from_source(&source);
                if let Some(ep) = &endpoint {
                    info!(
                        "Got PACER endpoint={} for identifier={} and name={}",
                        ep.server_url, org_id, provider.name
                    );
                }
                endpoint
            }
            Ok(None) => None,
            Err(e) => {
                warn!("PACER index lookup failed for {}: {}", org_id, e);
                None
            }
        }
    }

    /// First provider, in list order, that resolves to an endpoint.
    pub async fn resolve(&self, providers: &[Provider]) -> Option<ResolvedEndpoint> {
        for provider in providers {
            if let Some(endpoint) = self.resolve_provider(provider).await {
                return Some(endpoint);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TypeableId;
    use crate::error::{Result, SyncError};
    use crate::wire::SourceSecurity;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockIndex {
        calls: Mutex<Vec<(Option<String>, Option<String>)>>,
        answer_for: String,
    }

    #[async_trait]
    impl IndexServicePort for MockIndex {
        async fn lookup(
            &self,
            organization_id: Option<&str>,
            provider_name: Option<&str>,
        ) -> Result<Option<PacerSource>> {
            self.calls.lock().unwrap().push((
                organization_id.map(String::from),
                provider_name.map(String::from),
            ));
            if provider_name == Some("down") {
                return Err(SyncError::Transport("connection refused".into()));
            }
            if organization_id == Some(self.answer_for.as_str()) {
                return Ok(Some(PacerSource {
                    source_type: "ecr".into(),
                    server_url: "https://pacer.example/job".into(),
                    security: Some(SourceSecurity {
                        security_type: "Basic".into(),
                        username: "user".into(),
                        password: "pass".into(),
                    }),
                }));
            }
            Ok(None)
        }
    }

    #[test]
    fn basic_header_encoding() {
        assert_eq!(basic_auth_header("user", "pass"), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn non_ecr_sources_are_unusable() {
        let source = PacerSource {
            source_type: "ELR".into(),
            server_url: "https://x".into(),
            security: None,
        };
        assert!(endpoint_from_source(&source).is_none());
    }

    #[tokio::test]
    async fn first_resolving_provider_wins() {
        let index = Arc::new(MockIndex {
            calls: Mutex::new(Vec::new()),
            answer_for: "NPI|2".into(),
        });
        let resolver = EndpointResolver::new(index.clone());
        let providers = vec![
            Provider::new(TypeableId::new("NPI", "1"), "down"),
            Provider::new(TypeableId::new("NPI", "2"), "Clinic"),
            Provider::new(TypeableId::new("NPI", "3"), "Other"),
        ];

        let endpoint = resolver.resolve(&providers).await.unwrap();
        assert_eq!(endpoint.server_url, "https://pacer.example/job");
        assert_eq!(endpoint.auth_header.as_deref(), Some("Basic dXNlcjpwYXNz"));

        let calls = index.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0.as_deref(), Some("NPI|2"));
        assert_eq!(calls[1].1.as_deref(), Some("Clinic"));
    }

    #[tokio::test]
    async fn no_provider_resolves() {
        let index = Arc::new(MockIndex {
            calls: Mutex::new(Vec::new()),
            answer_for: "none".into(),
        });
        let resolver = EndpointResolver::new(index);
        let providers = vec![Provider::new(TypeableId::new("NPI", "1"), "Clinic")];
        assert!(resolver.resolve(&providers).await.is_none());
    }
}
