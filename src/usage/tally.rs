//! In-process usage counts.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::observability::metrics;
use crate::usage::types::{UsageEvent, UsageResult, UsageSink};

/// Counts events per credential id.
#[derive(Debug, Default)]
pub struct UsageTally {
    counts: DashMap<String, u64>,
}

impl UsageTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, credential_id: &str) -> u64 {
        self.counts.get(credential_id).map(|c| *c).unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|entry| *entry.value()).sum()
    }

    /// Current counts, for periodic export.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

#[async_trait]
impl UsageSink for UsageTally {
    async fn record(&self, event: UsageEvent) -> UsageResult<()> {
        *self.counts.entry(event.credential_id).or_insert(0) += 1;
        metrics::record_usage();
        Ok(())
    }
}
