//! Google Play Integrity verification.
//!
//! # Protocol
//! ```text
//! X-Play-Integrity-Key
//!     → bypass token? → Bypassed
//!     → ClientCache (one signed client per Cloud project)
//!     → POST {api_base}/v1/{package}:decodeIntegrityToken
//!     → MEETS_DEVICE_INTEGRITY && app verdict allowed → Verified
//! ```

use std::time::Duration;

use async_trait::async_trait;

use crate::attestation::google::{ClientCache, TokenPayload};
use crate::attestation::{
    matches_bypass, Attestation, AttestationError, AttestationRequest, AttestationResult,
    ValidationMode, Verifier,
};
use crate::config::PlayIntegritySettings;
use crate::credentials::{Credential, PlayIntegrityConfig};
use crate::security::headers::PLAY_INTEGRITY_KEY;

const MEETS_DEVICE_INTEGRITY: &str = "MEETS_DEVICE_INTEGRITY";

pub struct PlayIntegrityVerifier {
    cache: ClientCache,
    api_base: String,
}

impl PlayIntegrityVerifier {
    pub fn new(http: reqwest::Client, settings: &PlayIntegritySettings) -> Self {
        Self {
            cache: ClientCache::new(
                http,
                &settings.scope,
                settings.client_cache_capacity,
                Duration::from_secs(settings.client_ttl_secs),
            ),
            api_base: settings.api_base.clone(),
        }
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }
}

/// Check decoded verdicts against the credential's policy.
pub fn evaluate(payload: &TokenPayload, config: &PlayIntegrityConfig) -> AttestationResult<()> {
    let device_ok = payload
        .device_integrity
        .device_recognition_verdict
        .iter()
        .any(|v| v == MEETS_DEVICE_INTEGRITY);
    if !device_ok {
        return Err(AttestationError::VerdictRejected(format!(
            "device verdict {:?}",
            payload.device_integrity.device_recognition_verdict
        )));
    }

    match payload.app_integrity.app_recognition_verdict {
        Some(verdict) if config.allowed_app_verdicts.contains(&verdict) => {}
        other => {
            return Err(AttestationError::VerdictRejected(format!(
                "app verdict {:?}",
                other
            )))
        }
    }

    if let Some(package) = payload.app_integrity.package_name.as_deref() {
        if package != config.package_name {
            return Err(AttestationError::VerdictRejected(format!(
                "token issued for package {}",
                package
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl Verifier for PlayIntegrityVerifier {
    async fn verify(
        &self,
        credential: &Credential,
        request: AttestationRequest<'_>,
    ) -> AttestationResult<Attestation> {
        let config = credential
            .play_integrity()
            .ok_or(AttestationError::NotConfigured(ValidationMode::PlayIntegrity))?;

        let token = request
            .headers
            .get(PLAY_INTEGRITY_KEY)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(AttestationError::MissingToken(ValidationMode::PlayIntegrity))?;

        if matches_bypass(token, &config.bypass_token) {
            tracing::debug!(credential = %credential.id, "Play Integrity bypass token presented");
            return Ok(Attestation::Bypassed);
        }

        let client = self.cache.get_or_create(&config.service_account)?;
        let payload = client
            .decode_integrity_token(&self.api_base, &config.package_name, token)
            .await?;

        evaluate(&payload, config)?;
        Ok(Attestation::Verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::google::{AppIntegrity, DeviceIntegrity};
    use crate::credentials::{AppVerdict, AttestationProfile, ServiceAccountKey};
    use axum::http::{HeaderMap, HeaderValue};
    use std::sync::Arc;

    fn config() -> PlayIntegrityConfig {
        PlayIntegrityConfig {
            package_name: "com.example.app".into(),
            service_account: ServiceAccountKey {
                client_email: "verifier@p1.iam.gserviceaccount.com".into(),
                private_key: "not a key".into(),
                project_id: "p1".into(),
                token_uri: "http://127.0.0.1:9/token".into(),
                private_key_id: None,
            },
            bypass_token: "play-bypass-0123456789".into(),
            allowed_app_verdicts: AppVerdict::default_allowed(),
        }
    }

    fn payload(app: Option<AppVerdict>, device: &[&str]) -> TokenPayload {
        TokenPayload {
            app_integrity: AppIntegrity {
                app_recognition_verdict: app,
                package_name: Some("com.example.app".into()),
            },
            device_integrity: DeviceIntegrity {
                device_recognition_verdict: device.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    fn credential(play_integrity: Option<PlayIntegrityConfig>) -> Credential {
        Credential {
            id: "c1".into(),
            server_share: "AAAA".into(),
            whitelist: Vec::new(),
            rate_limit: None,
            allows_web: false,
            attestation: Some(Arc::new(AttestationProfile {
                project_id: "p1".into(),
                device_check: None,
                play_integrity,
            })),
        }
    }

    fn verifier() -> PlayIntegrityVerifier {
        PlayIntegrityVerifier::new(
            reqwest::Client::new(),
            &PlayIntegritySettings {
                api_base: "http://127.0.0.1:9".into(),
                scope: "https://www.googleapis.com/auth/playintegrity".into(),
                client_cache_capacity: 4,
                client_ttl_secs: 3600,
            },
        )
    }

    #[test]
    fn test_evaluate_accepts_trusted_device() {
        let p = payload(
            Some(AppVerdict::PlayRecognized),
            &["MEETS_BASIC_INTEGRITY", "MEETS_DEVICE_INTEGRITY"],
        );
        assert!(evaluate(&p, &config()).is_ok());
    }

    #[test]
    fn test_evaluate_requires_device_integrity() {
        let p = payload(Some(AppVerdict::PlayRecognized), &["MEETS_BASIC_INTEGRITY"]);
        assert!(matches!(evaluate(&p, &config()), Err(AttestationError::VerdictRejected(_))));

        let p = payload(Some(AppVerdict::PlayRecognized), &[]);
        assert!(matches!(evaluate(&p, &config()), Err(AttestationError::VerdictRejected(_))));
    }

    #[test]
    fn test_evaluate_app_verdict_policy() {
        let unrecognized = payload(Some(AppVerdict::UnrecognizedVersion), &["MEETS_DEVICE_INTEGRITY"]);
        assert!(evaluate(&unrecognized, &config()).is_err());

        let mut relaxed = config();
        relaxed.allowed_app_verdicts.insert(AppVerdict::UnrecognizedVersion);
        assert!(evaluate(&unrecognized, &relaxed).is_ok());

        let missing = payload(None, &["MEETS_DEVICE_INTEGRITY"]);
        assert!(evaluate(&missing, &relaxed).is_err());
    }

    #[test]
    fn test_evaluate_package_mismatch() {
        let mut p = payload(Some(AppVerdict::PlayRecognized), &["MEETS_DEVICE_INTEGRITY"]);
        p.app_integrity.package_name = Some("com.other.app".into());
        assert!(matches!(evaluate(&p, &config()), Err(AttestationError::VerdictRejected(_))));
    }

    #[tokio::test]
    async fn test_bypass_skips_google() {
        let v = verifier();
        let mut headers = HeaderMap::new();
        headers.insert(PLAY_INTEGRITY_KEY, HeaderValue::from_static("play-bypass-0123456789"));

        let outcome = v
            .verify(&credential(Some(config())), AttestationRequest { headers: &headers, path: "/proxy" })
            .await
            .unwrap();
        assert_eq!(outcome, Attestation::Bypassed);
        assert!(v.cache().is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_and_config() {
        let v = verifier();
        let headers = HeaderMap::new();
        let err = v
            .verify(&credential(Some(config())), AttestationRequest { headers: &headers, path: "/proxy" })
            .await
            .unwrap_err();
        assert!(matches!(err, AttestationError::MissingToken(ValidationMode::PlayIntegrity)));

        let err = v
            .verify(&credential(None), AttestationRequest { headers: &headers, path: "/proxy" })
            .await
            .unwrap_err();
        assert!(matches!(err, AttestationError::NotConfigured(ValidationMode::PlayIntegrity)));
    }
}
