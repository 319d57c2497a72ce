//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Load credentials and start their watcher
//! - Build the usage sinks and the gateway
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use thiserror::Error;

use crate::config::{ConfigError, GatewayConfig};
use crate::credentials::{CredentialsWatcher, StaticCredentialStore, StoreError};
use crate::proxy::{GatewayError, ProxyGateway};
use crate::usage::{UsageError, UsageFanout, UsageSink, UsageTally, WebhookUsageSink};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credentials(#[from] StoreError),

    #[error("credentials watcher: {0}")]
    Watcher(#[from] notify::Error),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// A gateway and everything that must outlive it.
pub struct Gateway {
    pub gateway: Arc<ProxyGateway>,
    pub store: Arc<StaticCredentialStore>,
    pub usage: Arc<UsageTally>,
    /// Dropping this stops credential hot reload.
    pub watcher: Option<RecommendedWatcher>,
}

impl Gateway {
    /// Build every subsystem from a validated configuration.
    pub fn build(config: &GatewayConfig) -> Result<Self, StartupError> {
        let store = Arc::new(StaticCredentialStore::from_file(&config.credentials.path)?);

        let watcher = if config.credentials.watch {
            Some(CredentialsWatcher::new(&config.credentials.path, store.clone()).run()?)
        } else {
            None
        };

        let tally = Arc::new(UsageTally::new());
        let mut usage = UsageFanout::new().with(tally.clone());
        if let Some(url) = &config.usage.webhook_url {
            let webhook = WebhookUsageSink::new(url.as_str(), Duration::from_secs(config.usage.timeout_secs))?;
            tracing::info!(url = %webhook.url(), "Usage webhook enabled");
            usage = usage.with(Arc::new(webhook));
        }
        let usage: Arc<dyn UsageSink> = Arc::new(usage);

        let gateway = ProxyGateway::from_config(config, store.clone(), usage)?;

        tracing::info!(
            credentials = store.len(),
            rate_window_secs = config.rate_limit.window_secs,
            blocked_destinations = config.security.blocked_destinations.len(),
            "Gateway initialized"
        );

        Ok(Self {
            gateway: Arc::new(gateway),
            store,
            usage: tally,
            watcher,
        })
    }
}
