//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that remote endpoints are absolute URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::GatewayConfig;

/// One semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }

    let timeouts = [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.upstream_secs", config.timeouts.upstream_secs),
        ("timeouts.attestation_secs", config.timeouts.attestation_secs),
        ("rate_limit.window_secs", config.rate_limit.window_secs),
        ("rate_limit.sweep_interval_secs", config.rate_limit.sweep_interval_secs),
        ("attestation.device_check.key_ttl_secs", config.attestation.device_check.key_ttl_secs),
        ("attestation.play_integrity.client_ttl_secs", config.attestation.play_integrity.client_ttl_secs),
        ("usage.timeout_secs", config.usage.timeout_secs),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if config.timeouts.upstream_secs > config.timeouts.request_secs {
        errors.push(ValidationError::new(
            "timeouts.upstream_secs",
            "must not exceed timeouts.request_secs",
        ));
    }

    if config.attestation.device_check.keyring_capacity == 0 {
        errors.push(ValidationError::new(
            "attestation.device_check.keyring_capacity",
            "must be greater than zero",
        ));
    }
    if config.attestation.play_integrity.client_cache_capacity == 0 {
        errors.push(ValidationError::new(
            "attestation.play_integrity.client_cache_capacity",
            "must be greater than zero",
        ));
    }

    check_url(&mut errors, "attestation.device_check.endpoint", &config.attestation.device_check.endpoint);
    check_url(&mut errors, "attestation.play_integrity.api_base", &config.attestation.play_integrity.api_base);
    if let Some(webhook) = &config.usage.webhook_url {
        check_url(&mut errors, "usage.webhook_url", webhook);
    }

    for path in &config.attestation.device_check.excluded_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::new(
                "attestation.device_check.excluded_paths",
                format!("'{}' must start with '/'", path),
            ));
        }
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than zero"));
    }

    if config.security.blocked_destinations.iter().any(|h| h.trim().is_empty()) {
        errors.push(ValidationError::new("security.blocked_destinations", "contains an empty host"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::new(field, format!("'{}' is not an http(s) URL", value))),
    }
}
