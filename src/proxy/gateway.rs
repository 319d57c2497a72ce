//! The request pipeline.

use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;

use crate::attestation::web::apply_cors;
use crate::attestation::{Attestation, AttestationRequest, AttestationVerifier};
use crate::config::GatewayConfig;
use crate::credentials::CredentialStore;
use crate::proxy::forward::Forwarder;
use crate::proxy::request::ProxyRequest;
use crate::proxy::types::{GatewayError, GatewayResult};
use crate::secret;
use crate::security::headers::{
    extract_client_share, inject_secret, strip_control_headers, PlaceholderError,
};
use crate::security::whitelist::{is_allowed, is_blocked};
use crate::security::RateLimiter;
use crate::usage::{UsageEvent, UsageSink};

/// Owns every collaborator a proxied request passes through.
pub struct ProxyGateway {
    store: Arc<dyn CredentialStore>,
    limiter: RateLimiter,
    verifier: AttestationVerifier,
    forwarder: Forwarder,
    usage: Arc<dyn UsageSink>,
    blocked_destinations: Vec<String>,
}

impl ProxyGateway {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        limiter: RateLimiter,
        verifier: AttestationVerifier,
        forwarder: Forwarder,
        usage: Arc<dyn UsageSink>,
    ) -> Self {
        Self {
            store,
            limiter,
            verifier,
            forwarder,
            usage,
            blocked_destinations: Vec::new(),
        }
    }

    /// Hosts that are refused even when a whitelist allows them.
    pub fn with_blocked_destinations(mut self, hosts: Vec<String>) -> Self {
        self.blocked_destinations = hosts;
        self
    }

    /// Build the limiter, verifier and forwarder from configuration.
    pub fn from_config(
        config: &GatewayConfig,
        store: Arc<dyn CredentialStore>,
        usage: Arc<dyn UsageSink>,
    ) -> GatewayResult<Self> {
        let limiter = RateLimiter::new(Duration::from_secs(config.rate_limit.window_secs));
        let verifier = AttestationVerifier::new(&config.attestation, &config.timeouts)?;
        let forwarder = Forwarder::new(&config.timeouts)?;

        Ok(Self::new(store, limiter, verifier, forwarder, usage)
            .with_blocked_destinations(config.security.blocked_destinations.clone()))
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn verifier(&self) -> &AttestationVerifier {
        &self.verifier
    }

    /// Run one request through every gate and forward it.
    pub async fn handle(&self, request: ProxyRequest) -> GatewayResult<Response> {
        let ProxyRequest {
            association_id,
            method,
            destination,
            mut headers,
            body,
            path,
        } = request;

        let credential = self
            .store
            .find(&association_id)
            .await?
            .ok_or(GatewayError::CredentialNotFound)?;

        if !self.limiter.check(&credential).is_allowed() {
            return Err(GatewayError::RateLimitExceeded);
        }

        let attestation = self
            .verifier
            .verify(&credential, AttestationRequest { headers: &headers, path: &path })
            .await?;

        if is_blocked(&self.blocked_destinations, &destination) {
            return Err(GatewayError::BlockedDestination);
        }
        if !is_allowed(&credential.whitelist, &destination) {
            return Err(GatewayError::WhitelistViolation);
        }

        let client_share = extract_client_share(&headers).map_err(|e| match e {
            PlaceholderError::Missing => GatewayError::ClientHeader("key placeholder carries no share"),
            PlaceholderError::Conflicting => {
                GatewayError::ClientHeader("key placeholders carry different shares")
            }
        })?;
        {
            let secret = secret::reconstruct(&credential.server_share, &client_share)?;
            inject_secret(&mut headers, &client_share, &secret)
                .map_err(|_| GatewayError::ClientHeader("secret is not a valid header value"))?;
        }
        strip_control_headers(&mut headers);

        let destination_host = destination.host_str().unwrap_or_default().to_string();
        let method_name = method.to_string();

        tracing::debug!(
            credential = %credential.id,
            method = %method_name,
            host = %destination_host,
            attestation = attestation.as_str(),
            "Forwarding request"
        );

        let mut response = self.forwarder.send(method, destination, headers, body).await?;

        let event = UsageEvent::new(
            &credential,
            &method_name,
            &destination_host,
            response.status().as_u16(),
            attestation.as_str(),
        );
        let usage = self.usage.clone();
        tokio::spawn(async move {
            let credential_id = event.credential_id.clone();
            if let Err(e) = usage.record(event).await {
                tracing::warn!(credential = %credential_id, error = %e, "Usage event not recorded");
            }
        });

        if attestation == Attestation::CrossOrigin {
            apply_cors(response.headers_mut());
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::AttestationError;
    use crate::config::{AttestationConfig, TimeoutConfig};
    use crate::credentials::{Credential, StaticCredentialStore};
    use crate::security::WhitelistEntry;
    use crate::usage::UsageTally;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    struct Harness {
        gateway: ProxyGateway,
        usage: Arc<UsageTally>,
        client_share: String,
    }

    fn harness(rate_limit: Option<u32>, allows_web: bool) -> Harness {
        let shares = secret::split("sk-live-ABC");
        let credential = Credential {
            id: "cred-1".into(),
            server_share: shares.server.clone(),
            whitelist: vec![WhitelistEntry::parse("127.0.0.1/v1").unwrap()],
            rate_limit,
            allows_web,
            attestation: None,
        };
        let store = Arc::new(StaticCredentialStore::new([credential]));
        let usage = Arc::new(UsageTally::new());
        let timeouts = TimeoutConfig::default();
        let gateway = ProxyGateway::new(
            store,
            RateLimiter::new(Duration::from_secs(300)),
            AttestationVerifier::new(&AttestationConfig::default(), &timeouts).unwrap(),
            Forwarder::new(&timeouts).unwrap(),
            usage.clone(),
        )
        .with_blocked_destinations(vec!["blocked.example.com".into()]);

        Harness {
            gateway,
            usage,
            client_share: shares.client,
        }
    }

    fn request(id: &str, mode: &str, destination: &str, share: &str) -> ProxyRequest {
        request_with(id, mode, destination, share, &[])
    }

    fn request_with(
        id: &str,
        mode: &str,
        destination: &str,
        share: &str,
        extra: &[(&str, &str)],
    ) -> ProxyRequest {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/proxy")
            .header("association_id", id)
            .header("http_method", "GET")
            .header("destination", destination)
            .header("validation_mode", mode);
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .header("authorization", format!("Bearer %PARTIAL_KEY:{}%", share))
            .body(Body::empty())
            .unwrap();
        ProxyRequest::from_request(request).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_credential() {
        let h = harness(None, true);
        let err = h
            .gateway
            .handle(request("nope", "web", "http://127.0.0.1:9/v1/x", &h.client_share))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::CredentialNotFound));
    }

    #[tokio::test]
    async fn test_web_not_allowed() {
        let h = harness(None, false);
        let err = h
            .gateway
            .handle(request("cred-1", "web", "http://127.0.0.1:9/v1/x", &h.client_share))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Attestation(AttestationError::WebNotAllowed)));
        assert_eq!(h.usage.total(), 0);
    }

    #[tokio::test]
    async fn test_whitelist_and_block_list() {
        let h = harness(None, true);
        let err = h
            .gateway
            .handle(request("cred-1", "web", "http://evil.com/v1/x", &h.client_share))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::WhitelistViolation));

        let err = h
            .gateway
            .handle(request("cred-1", "web", "http://blocked.example.com/v1/x", &h.client_share))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BlockedDestination));

        let err = h
            .gateway
            .handle(request("cred-1", "web", "http://127.0.0.1:9/v2/x", &h.client_share))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::WhitelistViolation));
    }

    #[tokio::test]
    async fn test_bad_client_share() {
        let h = harness(None, true);
        let err = h
            .gateway
            .handle(request("cred-1", "web", "http://127.0.0.1:9/v1/x", "!!!not-base64!!!"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[tokio::test]
    async fn test_conflicting_shares_never_forwarded() {
        let h = harness(None, true);
        let err = h
            .gateway
            .handle(request_with(
                "cred-1",
                "web",
                "http://127.0.0.1:9/v1/x",
                &h.client_share,
                &[("x-signature", "%PARTIAL_KEY:BBBB%")],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ClientHeader(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.usage.total(), 0);
    }

    #[tokio::test]
    async fn test_malformed_placeholder_does_not_hide_valid_one() {
        let h = harness(None, true);
        // reaching the unroutable upstream means the share was found and applied
        let err = h
            .gateway
            .handle(request_with(
                "cred-1",
                "web",
                "http://127.0.0.1:9/v1/x",
                &h.client_share,
                &[("a-first", "%PARTIAL_KEY:oops")],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_denies_before_attestation() {
        let h = harness(Some(1), false);
        // first request is counted, then fails attestation
        let err = h
            .gateway
            .handle(request("cred-1", "web", "http://127.0.0.1:9/v1/x", &h.client_share))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Attestation(_)));

        let err = h
            .gateway
            .handle(request("cred-1", "web", "http://127.0.0.1:9/v1/x", &h.client_share))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RateLimitExceeded));
        assert_eq!(h.gateway.limiter().current_count("cred-1"), Some(1));
    }

    #[tokio::test]
    async fn test_unreachable_destination_is_bad_gateway() {
        let h = harness(None, true);
        let err = h
            .gateway
            .handle(request("cred-1", "web", "http://127.0.0.1:9/v1/x", &h.client_share))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
        assert_eq!(h.usage.total(), 0);
    }
}
