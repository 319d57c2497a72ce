//! Secret sharing subsystem.
//!
//! # Data Flow
//! ```text
//! Provisioning (offline, keyshare-cli split):
//!     provider secret
//!     → splitter.rs (random pad R, secret XOR R)
//!     → server share (credential store) + client share (shipped in the app)
//!
//! Per request:
//!     server share + client share (from placeholder header)
//!     → splitter.rs (XOR, UTF-8 decode)
//!     → Zeroizing<String> secret, dropped after header rewrite
//! ```
//!
//! # Design Decisions
//! - One-time pad: each split draws a fresh pad from the OS RNG
//! - Decode failures are explicit errors, never an empty secret

pub mod splitter;

pub use splitter::{reconstruct, reconstruct_bytes, split, DecodeError, SecretShares};
