//! JSON webhook delivery.

use std::time::Duration;

use async_trait::async_trait;

use crate::usage::types::{UsageError, UsageEvent, UsageResult, UsageSink};

/// POSTs each event to a fixed URL.
pub struct WebhookUsageSink {
    http: reqwest::Client,
    url: String,
}

impl WebhookUsageSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> UsageResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl UsageSink for WebhookUsageSink {
    async fn record(&self, event: UsageEvent) -> UsageResult<()> {
        let response = self.http.post(&self.url).json(&event).send().await?;
        if !response.status().is_success() {
            return Err(UsageError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}
