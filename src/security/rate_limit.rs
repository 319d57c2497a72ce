//! Per-credential fixed-window rate limiting.
//!
//! # State Machine
//! ```text
//! absent ──first request──▶ tracking(count=1, window_start=now)
//! tracking ──window elapsed──▶ tracking(count=1, window_start=now)
//! tracking ──count < limit──▶ tracking(count+1)
//! tracking ──count >= limit──▶ denied (no increment)
//! ```
//!
//! # Design Decisions
//! - Check-and-increment runs under the map shard lock for that credential,
//!   so concurrent requests can never overshoot the limit
//! - Credentials without a limit never create state
//! - State is in memory only and lost on restart

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::credentials::Credential;
use crate::observability::metrics;

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// No limit configured for the credential.
    Unlimited,
    /// Allowed; `count` is the request's position in the current window.
    Allowed { count: u32 },
    /// Window is full.
    Denied,
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, RateDecision::Denied)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    limit: u32,
    window_start: Instant,
}

/// In-memory limiter keyed by credential id.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window,
        }
    }

    /// Check and count one request for `credential`.
    pub fn check(&self, credential: &Credential) -> RateDecision {
        let decision = self.check_at(&credential.id, credential.rate_limit, Instant::now());
        if decision == RateDecision::Denied {
            tracing::warn!(credential = %credential.id, "Rate limit exceeded");
            metrics::record_rate_limited();
        }
        decision
    }

    /// Same as [`check`](Self::check) with an explicit clock reading.
    pub fn check_at(&self, key: &str, limit: Option<u32>, now: Instant) -> RateDecision {
        let Some(limit) = limit else {
            return RateDecision::Unlimited;
        };

        match self.windows.entry(key.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(RateWindow {
                    count: 1,
                    limit,
                    window_start: now,
                });
                RateDecision::Allowed { count: 1 }
            }
            Entry::Occupied(mut slot) => {
                let state = slot.get_mut();
                if now.saturating_duration_since(state.window_start) >= self.window {
                    *state = RateWindow {
                        count: 1,
                        limit,
                        window_start: now,
                    };
                    RateDecision::Allowed { count: 1 }
                } else if state.count >= state.limit {
                    RateDecision::Denied
                } else {
                    state.count += 1;
                    RateDecision::Allowed { count: state.count }
                }
            }
        }
    }

    /// Drop windows whose period has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, state| now.saturating_duration_since(state.window_start) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Current count for a credential, if it is being tracked.
    pub fn current_count(&self, key: &str) -> Option<u32> {
        self.windows.get(key).map(|w| w.count)
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
