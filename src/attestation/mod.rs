//! Device and app attestation subsystem.
//!
//! # Data Flow
//! ```text
//! VALIDATION_MODE header
//!     → ValidationMode (tagged enum, unknown/absent → 401)
//!     → exactly one verifier:
//!         device_check.rs   (ES256 JWT + Apple validate_device_token)
//!         play_integrity.rs (Google decodeIntegrityToken via google.rs client cache)
//!         web.rs            (credential.allows_web, then permissive CORS)
//!     → Attestation outcome or terminal AttestationError
//! ```
//!
//! # Design Decisions
//! - Bypass tokens are compared in constant time and skip the remote call
//! - Remote calls run on a client with explicit connect and total timeouts
//! - Verdict rejections are 403; every other failure is 401

pub mod device_check;
pub mod google;
pub mod play_integrity;
pub mod web;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::{AttestationConfig, TimeoutConfig};
use crate::credentials::Credential;
use crate::observability::metrics;
use crate::security::headers::VALIDATION_MODE;

pub use device_check::DeviceCheckVerifier;
pub use play_integrity::PlayIntegrityVerifier;
pub use web::WebVerifier;

/// Attestation modes a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationMode {
    DeviceCheck,
    PlayIntegrity,
    Web,
}

impl ValidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::DeviceCheck => "device-check",
            ValidationMode::PlayIntegrity => "play-integrity",
            ValidationMode::Web => "web",
        }
    }

    /// Read the mode from the request headers.
    pub fn from_headers(headers: &HeaderMap) -> AttestationResult<Self> {
        let raw = headers
            .get(VALIDATION_MODE)
            .ok_or(AttestationError::MissingMode)?
            .to_str()
            .map_err(|_| AttestationError::UnknownMode("<non-ascii>".to_string()))?;
        raw.parse()
    }
}

impl FromStr for ValidationMode {
    type Err = AttestationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "device-check" => Ok(ValidationMode::DeviceCheck),
            "play-integrity" => Ok(ValidationMode::PlayIntegrity),
            "web" => Ok(ValidationMode::Web),
            other => Err(AttestationError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a request passed attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attestation {
    /// The platform vouched for the device or app.
    Verified,
    /// The caller presented the credential's bypass token.
    Bypassed,
    /// The request path is excluded from verification.
    Skipped,
    /// Browser traffic; answer with permissive CORS headers.
    CrossOrigin,
}

impl Attestation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attestation::Verified => "verified",
            Attestation::Bypassed => "bypassed",
            Attestation::Skipped => "skipped",
            Attestation::CrossOrigin => "cross_origin",
        }
    }
}

/// Errors that end attestation.
#[derive(Debug, Error)]
pub enum AttestationError {
    #[error("validation mode header missing")]
    MissingMode,

    #[error("unknown validation mode '{0}'")]
    UnknownMode(String),

    #[error("{0} is not configured for this credential")]
    NotConfigured(ValidationMode),

    #[error("{0} token missing")]
    MissingToken(ValidationMode),

    #[error("web requests are not enabled for this credential")]
    WebNotAllowed,

    /// The platform refused the token.
    #[error("attestation rejected: {0}")]
    Rejected(String),

    /// The token was decoded but its verdicts are not acceptable.
    #[error("verdict rejected: {0}")]
    VerdictRejected(String),

    #[error("signing key error: {0}")]
    Key(String),

    #[error("attestation service error: {0}")]
    Upstream(String),

    #[error("attestation service timed out")]
    Timeout,
}

impl AttestationError {
    pub fn status(&self) -> StatusCode {
        match self {
            AttestationError::VerdictRejected(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AttestationError::Timeout
        } else {
            AttestationError::Upstream(e.without_url().to_string())
        }
    }
}

pub type AttestationResult<T> = Result<T, AttestationError>;

/// The parts of an inbound request a verifier may inspect.
#[derive(Debug, Clone, Copy)]
pub struct AttestationRequest<'a> {
    pub headers: &'a HeaderMap,
    pub path: &'a str,
}

/// One attestation strategy.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        credential: &Credential,
        request: AttestationRequest<'_>,
    ) -> AttestationResult<Attestation>;
}

/// Constant-time bypass token comparison. Empty tokens never match.
pub fn matches_bypass(presented: &str, configured: &str) -> bool {
    if configured.is_empty() {
        return false;
    }
    presented.as_bytes().ct_eq(configured.as_bytes()).into()
}

/// Dispatches each request to the verifier its mode selects.
pub struct AttestationVerifier {
    device_check: DeviceCheckVerifier,
    play_integrity: PlayIntegrityVerifier,
    web: WebVerifier,
}

impl AttestationVerifier {
    pub fn new(config: &AttestationConfig, timeouts: &TimeoutConfig) -> AttestationResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.attestation_secs))
            .build()
            .map_err(AttestationError::from_reqwest)?;

        Ok(Self {
            device_check: DeviceCheckVerifier::new(http.clone(), &config.device_check),
            play_integrity: PlayIntegrityVerifier::new(http, &config.play_integrity),
            web: WebVerifier,
        })
    }

    /// Run the verifier selected by the request's mode header.
    pub async fn verify(
        &self,
        credential: &Credential,
        request: AttestationRequest<'_>,
    ) -> AttestationResult<Attestation> {
        let mode = ValidationMode::from_headers(request.headers)?;

        let verifier: &dyn Verifier = match mode {
            ValidationMode::DeviceCheck => &self.device_check,
            ValidationMode::PlayIntegrity => &self.play_integrity,
            ValidationMode::Web => &self.web,
        };

        let result = verifier.verify(credential, request).await;
        match &result {
            Ok(outcome) => metrics::record_attestation(mode.as_str(), outcome.as_str()),
            Err(e) => {
                tracing::warn!(credential = %credential.id, mode = %mode, error = %e, "Attestation failed");
                metrics::record_attestation(mode.as_str(), "failed");
            }
        }
        result
    }

    pub fn device_check(&self) -> &DeviceCheckVerifier {
        &self.device_check
    }

    pub fn play_integrity(&self) -> &PlayIntegrityVerifier {
        &self.play_integrity
    }
}
