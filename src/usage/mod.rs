//! Usage accounting subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyGateway (after the upstream response head arrives)
//!     → tokio::spawn
//!     → UsageSink::record(UsageEvent)
//!         tally.rs   (in-memory per-credential counts + metrics counter)
//!         webhook.rs (JSON POST to the billing collaborator)
//!         fanout.rs  (all of the above, failures logged and swallowed)
//! ```
//!
//! # Design Decisions
//! - Delivery is best effort; a failed event never fails the request it describes
//! - Events carry no secret material, only ids, host and status

pub mod fanout;
pub mod tally;
pub mod types;
pub mod webhook;

pub use fanout::UsageFanout;
pub use tally::UsageTally;
pub use types::{UsageError, UsageEvent, UsageResult, UsageSink};
pub use webhook::WebhookUsageSink;
