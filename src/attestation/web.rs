//! Browser traffic.
//!
//! Web mode performs no device attestation. The credential must opt in with
//! `allows_web`, and the response then carries permissive CORS headers.

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::attestation::{Attestation, AttestationError, AttestationRequest, AttestationResult, Verifier};
use crate::credentials::Credential;

pub struct WebVerifier;

#[async_trait]
impl Verifier for WebVerifier {
    async fn verify(
        &self,
        credential: &Credential,
        _request: AttestationRequest<'_>,
    ) -> AttestationResult<Attestation> {
        if credential.allows_web {
            Ok(Attestation::CrossOrigin)
        } else {
            Err(AttestationError::WebNotAllowed)
        }
    }
}

/// Answers preflights for browser clients: any origin, no credentials.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers(Any)
}

/// Mark a proxied response as readable from any origin.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("*"));
    headers.remove(header::ACCESS_CONTROL_ALLOW_CREDENTIALS);
}
