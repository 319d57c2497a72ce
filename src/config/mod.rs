//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! Credential records live in their own document and reload on their own;
//! see `crate::credentials`.
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AttestationConfig, CredentialsConfig, DeviceCheckSettings, GatewayConfig, ListenerConfig,
    LogFormat, ObservabilityConfig, PlayIntegritySettings, RateLimitConfig, SecurityConfig,
    TimeoutConfig, TlsConfig, UsageConfig,
};
pub use validation::{validate_config, ValidationError};
