//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Resolved credential + parsed proxy request:
//!     → rate_limit.rs (per-credential fixed window)
//!     → [attestation]
//!     → whitelist.rs (blocked hosts, then host + path rules)
//!     → headers.rs (extract share, inject secret, strip control headers)
//!     → Forward
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Default deny: an empty whitelist forwards nowhere
//! - No trust in client input

pub mod headers;
pub mod rate_limit;
pub mod whitelist;

pub use rate_limit::{RateDecision, RateLimiter};
pub use whitelist::{WhitelistEntry, WhitelistError};
