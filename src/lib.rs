//! Split-key API gateway library.

pub mod attestation;
pub mod config;
pub mod credentials;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod secret;
pub mod security;
pub mod usage;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::ProxyGateway;
