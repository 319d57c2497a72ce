//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Per-credential rate window settings.
    pub rate_limit: RateLimitConfig,

    /// Remote attestation endpoints and caches.
    pub attestation: AttestationConfig,

    /// Where credential records come from.
    pub credentials: CredentialsConfig,

    /// Usage event delivery.
    pub usage: UsageConfig,

    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total time allowed for an inbound request in seconds.
    pub request_secs: u64,

    /// Time allowed for the forwarded call in seconds.
    pub upstream_secs: u64,

    /// Time allowed for each Apple or Google call in seconds.
    pub attestation_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 60,
            upstream_secs: 30,
            attestation_secs: 10,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Fixed window length in seconds.
    pub window_secs: u64,

    /// How often expired windows are dropped, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AttestationConfig {
    pub device_check: DeviceCheckSettings,
    pub play_integrity: PlayIntegritySettings,
}

/// Apple DeviceCheck settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceCheckSettings {
    /// `validate_device_token` endpoint. Use the development host for sandbox apps.
    pub endpoint: String,

    /// Paths that never require a device token.
    pub excluded_paths: Vec<String>,

    /// Maximum number of signing keys kept in the keyring.
    pub keyring_capacity: usize,

    /// Lifetime of a registered signing key in seconds.
    pub key_ttl_secs: u64,
}

impl Default for DeviceCheckSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.devicecheck.apple.com/v1/validate_device_token".to_string(),
            excluded_paths: vec!["/health".to_string()],
            keyring_capacity: 256,
            key_ttl_secs: 3600,
        }
    }
}

/// Google Play Integrity settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlayIntegritySettings {
    pub api_base: String,

    /// OAuth scope requested for service-account tokens.
    pub scope: String,

    /// Maximum number of cached per-project clients.
    pub client_cache_capacity: usize,

    /// Lifetime of a cached client in seconds.
    pub client_ttl_secs: u64,
}

impl Default for PlayIntegritySettings {
    fn default() -> Self {
        Self {
            api_base: "https://playintegrity.googleapis.com".to_string(),
            scope: "https://www.googleapis.com/auth/playintegrity".to_string(),
            client_cache_capacity: 256,
            client_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Path to the credentials document.
    pub path: PathBuf,

    /// Reload the document when it changes on disk.
    pub watch: bool,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("credentials.toml"),
            watch: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UsageConfig {
    /// POST each usage event as JSON to this URL. Events are only counted locally when unset.
    pub webhook_url: Option<String>,

    pub timeout_secs: u64,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 5,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Hosts that are never forwarded to, whatever a whitelist says.
    pub blocked_destinations: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            blocked_destinations: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
