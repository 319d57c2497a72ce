//! Split-key proxy pipeline.
//!
//! # Data Flow
//! ```text
//! POST /proxy
//!     → request.rs   (association id, method override, destination, placeholder present)
//!     → gateway.rs:
//!         1. CredentialStore::find           (unknown → 404)
//!         2. RateLimiter::check              (window full → 429)
//!         3. AttestationVerifier::verify     (401 / 403)
//!         4. blocked destinations, whitelist (403)
//!         5. client share → reconstruct      (400)
//!         6. inject secret, strip control and hop-by-hop headers
//!     → forward.rs   (one outbound call, body streamed both ways)
//!     → usage event on a spawned task
//!     → upstream status, headers and body returned as-is
//! ```
//!
//! # Design Decisions
//! - Every gate is terminal; nothing is retried and nothing is forwarded after a denial
//! - Error bodies are the canonical reason phrase; details go to the log
//! - The reconstructed secret lives only in zeroizing buffers and sensitive header values

pub mod forward;
pub mod gateway;
pub mod request;
pub mod types;

pub use forward::Forwarder;
pub use gateway::ProxyGateway;
pub use request::ProxyRequest;
pub use types::{GatewayError, GatewayResult};
