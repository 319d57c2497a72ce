//! Apple DeviceCheck verification.
//!
//! # Protocol
//! ```text
//! X-Apple-Device-Token
//!     → bypass token? → Bypassed
//!     → ES256 JWT { iss: team_id, iat } with kid = key_id
//!     → POST validate_device_token { device_token, transaction_id, timestamp }
//!     → 200 → Verified, anything else → Rejected
//! ```
//!
//! Signing keys are parsed once per key id and kept in a keyring bounded by
//! `key_ttl_secs` and `keyring_capacity`, so keys of projects dropped on reload
//! age out.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use crate::attestation::{
    matches_bypass, Attestation, AttestationError, AttestationRequest, AttestationResult,
    ValidationMode, Verifier,
};
use crate::config::DeviceCheckSettings;
use crate::credentials::{Credential, DeviceCheckConfig};
use crate::security::headers::APPLE_DEVICE_TOKEN;

#[derive(Debug, Serialize)]
struct DeviceCheckClaims<'a> {
    iss: &'a str,
    iat: u64,
}

#[derive(Debug, Serialize)]
struct ValidateDeviceToken<'a> {
    device_token: &'a str,
    transaction_id: String,
    timestamp: u128,
}

/// A signing key registered under its Apple key id.
struct RegisteredKey {
    pem: String,
    key: EncodingKey,
    registered_at: Instant,
}

/// Verifies DeviceCheck tokens against Apple.
pub struct DeviceCheckVerifier {
    http: reqwest::Client,
    endpoint: String,
    excluded_paths: Vec<String>,
    keyring: DashMap<String, Arc<RegisteredKey>>,
    keyring_capacity: usize,
    key_ttl: Duration,
}

impl DeviceCheckVerifier {
    pub fn new(http: reqwest::Client, settings: &DeviceCheckSettings) -> Self {
        Self {
            http,
            endpoint: settings.endpoint.clone(),
            excluded_paths: settings.excluded_paths.clone(),
            keyring: DashMap::new(),
            keyring_capacity: settings.keyring_capacity.max(1),
            key_ttl: Duration::from_secs(settings.key_ttl_secs),
        }
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|excluded| {
            let excluded = excluded.trim_end_matches('/');
            path == excluded || path.starts_with(&format!("{}/", excluded))
        })
    }

    /// Look up the key for `config.key_id`, registering or replacing it as needed.
    fn signing_key(&self, config: &DeviceCheckConfig) -> AttestationResult<Arc<RegisteredKey>> {
        self.signing_key_at(config, Instant::now())
    }

    fn signing_key_at(
        &self,
        config: &DeviceCheckConfig,
        now: Instant,
    ) -> AttestationResult<Arc<RegisteredKey>> {
        if let Some(existing) = self.keyring.get(&config.key_id) {
            let fresh = now.saturating_duration_since(existing.registered_at) < self.key_ttl;
            if fresh && existing.pem == config.private_key {
                return Ok(existing.clone());
            }
        }

        let key = EncodingKey::from_ec_pem(config.private_key.as_bytes())
            .map_err(|e| AttestationError::Key(e.to_string()))?;
        let registered = Arc::new(RegisteredKey {
            pem: config.private_key.clone(),
            key,
            registered_at: now,
        });
        self.keyring.remove(&config.key_id);
        self.evict(now);
        self.keyring.insert(config.key_id.clone(), registered.clone());
        tracing::debug!(kid = %config.key_id, registered = self.keyring.len(), "Registered DeviceCheck signing key");
        Ok(registered)
    }

    /// Drop expired keys, then the oldest ones until there is room for one more.
    fn evict(&self, now: Instant) {
        self.keyring
            .retain(|_, key| now.saturating_duration_since(key.registered_at) < self.key_ttl);

        while self.keyring.len() >= self.keyring_capacity {
            let oldest = self
                .keyring
                .iter()
                .min_by_key(|entry| entry.registered_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(kid) => {
                    self.keyring.remove(&kid);
                }
                None => break,
            }
        }
    }

    fn authorization_jwt(&self, config: &DeviceCheckConfig) -> AttestationResult<String> {
        let registered = self.signing_key(config)?;

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(config.key_id.clone());

        let claims = DeviceCheckClaims {
            iss: &config.team_id,
            iat: unix_now().as_secs(),
        };

        jsonwebtoken::encode(&header, &claims, &registered.key)
            .map_err(|e| AttestationError::Key(e.to_string()))
    }

    pub fn registered_keys(&self) -> usize {
        self.keyring.len()
    }

    pub fn has_key(&self, key_id: &str) -> bool {
        self.keyring.contains_key(key_id)
    }
}

#[async_trait]
impl Verifier for DeviceCheckVerifier {
    async fn verify(
        &self,
        credential: &Credential,
        request: AttestationRequest<'_>,
    ) -> AttestationResult<Attestation> {
        if self.is_excluded(request.path) {
            return Ok(Attestation::Skipped);
        }

        let config = credential
            .device_check()
            .ok_or(AttestationError::NotConfigured(ValidationMode::DeviceCheck))?;

        let device_token = request
            .headers
            .get(APPLE_DEVICE_TOKEN)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(AttestationError::MissingToken(ValidationMode::DeviceCheck))?;

        if matches_bypass(device_token, &config.bypass_token) {
            tracing::debug!(credential = %credential.id, "DeviceCheck bypass token presented");
            return Ok(Attestation::Bypassed);
        }

        let jwt = self.authorization_jwt(config)?;
        let body = ValidateDeviceToken {
            device_token,
            transaction_id: Uuid::new_v4().to_string(),
            timestamp: unix_now().as_millis(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(jwt)
            .json(&body)
            .send()
            .await
            .map_err(AttestationError::from_reqwest)?;

        match response.status() {
            StatusCode::OK => Ok(Attestation::Verified),
            status => Err(AttestationError::Rejected(format!(
                "DeviceCheck returned {}",
                status
            ))),
        }
    }
}

fn unix_now() -> std::time::Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
