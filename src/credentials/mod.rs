//! Credential subsystem.
//!
//! # Data Flow
//! ```text
//! credentials file (TOML: [[projects]] + [[credentials]])
//!     → document.rs (parse, resolve key files, validate as a whole)
//!     → model.rs (Credential, AttestationProfile)
//!     → store.rs (ArcSwap<HashMap<id, Arc<Credential>>>)
//!     → ProxyGateway looks up by association id
//!
//! On file change:
//!     watcher.rs detects change
//!     → document.rs reloads and validates
//!     → atomic swap; failed reloads keep the current records
//! ```
//!
//! # Design Decisions
//! - The gateway never mutates credentials; the store is read-only to it
//! - `CredentialStore` is a trait so a database-backed store can replace the file
//! - Secret material never appears in `Debug` output

pub mod document;
pub mod model;
pub mod store;
pub mod watcher;

pub use model::{AppVerdict, AttestationProfile, Credential, DeviceCheckConfig, PlayIntegrityConfig, ServiceAccountKey};
pub use store::{CredentialStore, StaticCredentialStore, StoreError};
pub use watcher::CredentialsWatcher;
