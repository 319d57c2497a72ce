//! Usage event and sink definitions.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::credentials::Credential;

/// One forwarded request, as reported to the usage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageEvent {
    pub credential_id: String,
    pub project_id: Option<String>,
    pub method: String,
    pub destination_host: String,
    /// Upstream status code.
    pub status: u16,
    /// How the request passed attestation.
    pub attestation: &'static str,
    /// Unix milliseconds.
    pub timestamp_ms: u64,
}

impl UsageEvent {
    pub fn new(
        credential: &Credential,
        method: &str,
        destination_host: &str,
        status: u16,
        attestation: &'static str,
    ) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            credential_id: credential.id.clone(),
            project_id: credential.project_id().map(str::to_string),
            method: method.to_string(),
            destination_host: destination_host.to_string(),
            status,
            attestation,
            timestamp_ms,
        }
    }
}

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("usage webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("usage webhook returned {0}")]
    Rejected(u16),
}

pub type UsageResult<T> = Result<T, UsageError>;

/// Receives usage increments. Implementations must be cheap to call concurrently.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, event: UsageEvent) -> UsageResult<()>;
}
