//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request id, trace, timeout, body limit, CORS)
//!     → POST /proxy, /v1/proxy → ProxyGateway
//!     → GET /health, /version
//!     → Send to client
//! ```

pub mod server;
pub mod tls;

pub use server::{AppState, HttpServer, X_REQUEST_ID};
