//! Delivery to several sinks at once.

use std::sync::Arc;

use async_trait::async_trait;

use crate::usage::types::{UsageEvent, UsageResult, UsageSink};

/// Sends every event to each sink; the first failure is returned after all have run.
#[derive(Default, Clone)]
pub struct UsageFanout {
    sinks: Vec<Arc<dyn UsageSink>>,
}

impl UsageFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl UsageSink for UsageFanout {
    async fn record(&self, event: UsageEvent) -> UsageResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(event.clone()).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
