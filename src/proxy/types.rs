//! Gateway error taxonomy.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::attestation::AttestationError;
use crate::credentials::StoreError;
use crate::secret::DecodeError;

/// Reasons a proxied request did not reach, or did not come back from, its destination.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A control header or the key placeholder is missing or malformed.
    #[error("bad client header: {0}")]
    ClientHeader(&'static str),

    #[error("credential not found")]
    CredentialNotFound,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error(transparent)]
    Attestation(#[from] AttestationError),

    #[error("destination is blocked")]
    BlockedDestination,

    #[error("destination not in whitelist")]
    WhitelistViolation,

    #[error("client share rejected: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The destination call failed before a response arrived.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream request timed out")]
    UpstreamTimeout,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::ClientHeader(_) | GatewayError::Decode(_) => StatusCode::BAD_REQUEST,
            GatewayError::CredentialNotFound => StatusCode::NOT_FOUND,
            GatewayError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Attestation(e) => e.status(),
            GatewayError::BlockedDestination | GatewayError::WhitelistViolation => {
                StatusCode::FORBIDDEN
            }
            GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::UpstreamTimeout
        } else {
            GatewayError::Upstream(e.without_url().to_string())
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let reason = status.canonical_reason().unwrap_or("Error");
        let mut response = Response::new(Body::from(reason));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
