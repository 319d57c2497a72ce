//! Credential records as the gateway consumes them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::security::whitelist::WhitelistEntry;

/// A provider secret the gateway may inject, plus the policy around it.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Association id presented by clients.
    pub id: String,
    /// Base64 server half of the split secret.
    pub server_share: String,
    /// Destinations this secret may be sent to.
    pub whitelist: Vec<WhitelistEntry>,
    /// Maximum requests per rate window, `None` for unlimited.
    pub rate_limit: Option<u32>,
    /// Whether browser clients may use this credential without attestation.
    pub allows_web: bool,
    /// Attestation settings of the owning project.
    pub attestation: Option<Arc<AttestationProfile>>,
}

impl Credential {
    pub fn device_check(&self) -> Option<&DeviceCheckConfig> {
        self.attestation.as_ref().and_then(|p| p.device_check.as_ref())
    }

    pub fn play_integrity(&self) -> Option<&PlayIntegrityConfig> {
        self.attestation.as_ref().and_then(|p| p.play_integrity.as_ref())
    }

    pub fn project_id(&self) -> Option<&str> {
        self.attestation.as_ref().map(|p| p.project_id.as_str())
    }
}

/// Per-project attestation configuration shared by all of its credentials.
#[derive(Debug, Clone)]
pub struct AttestationProfile {
    pub project_id: String,
    pub device_check: Option<DeviceCheckConfig>,
    pub play_integrity: Option<PlayIntegrityConfig>,
}

/// Apple DeviceCheck signing material.
#[derive(Clone)]
pub struct DeviceCheckConfig {
    /// PKCS#8 PEM of the ECDSA P-256 key issued by Apple.
    pub private_key: String,
    pub key_id: String,
    /// Apple team id, used as the JWT issuer.
    pub team_id: String,
    pub bypass_token: String,
}

impl fmt::Debug for DeviceCheckConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCheckConfig")
            .field("key_id", &self.key_id)
            .field("team_id", &self.team_id)
            .field("private_key", &"<redacted>")
            .field("bypass_token", &"<redacted>")
            .finish()
    }
}

/// Google Play Integrity settings.
#[derive(Clone)]
pub struct PlayIntegrityConfig {
    pub package_name: String,
    pub service_account: ServiceAccountKey,
    pub bypass_token: String,
    pub allowed_app_verdicts: HashSet<AppVerdict>,
}

impl fmt::Debug for PlayIntegrityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayIntegrityConfig")
            .field("package_name", &self.package_name)
            .field("service_account", &self.service_account)
            .field("bypass_token", &"<redacted>")
            .field("allowed_app_verdicts", &self.allowed_app_verdicts)
            .finish()
    }
}

/// The subset of a Google service-account JSON key the gateway needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub project_id: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// Play Integrity `appRecognitionVerdict` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppVerdict {
    PlayRecognized,
    UnrecognizedVersion,
    Unevaluated,
    /// Any value this gateway does not know; never accepted by default.
    #[serde(other)]
    Unknown,
}

impl AppVerdict {
    /// Verdicts accepted when a project does not configure any.
    pub fn default_allowed() -> HashSet<AppVerdict> {
        HashSet::from([AppVerdict::PlayRecognized])
    }
}
