//! Inbound request parsing.
//!
//! # Responsibilities
//! - Read the control headers (association id, method override, destination)
//! - Require at least one header carrying the key placeholder
//! - Keep the remaining headers and the unread body for forwarding

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Method, Request};
use url::Url;

use crate::proxy::types::{GatewayError, GatewayResult};
use crate::security::headers::{self, ASSOCIATION_ID, DESTINATION, HTTP_METHOD};

/// A parsed proxy call. The body has not been read.
#[derive(Debug)]
pub struct ProxyRequest {
    pub association_id: String,
    /// Method to use against the destination.
    pub method: Method,
    pub destination: Url,
    pub headers: HeaderMap,
    pub body: Body,
    /// Path the client called on the gateway.
    pub path: String,
}

impl ProxyRequest {
    pub fn from_request(request: Request<Body>) -> GatewayResult<Self> {
        let (parts, body) = request.into_parts();
        let headers = parts.headers;

        let association_id = required(&headers, &ASSOCIATION_ID, "association id missing")?.to_string();

        let method = required(&headers, &HTTP_METHOD, "method override missing")?;
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| GatewayError::ClientHeader("method override invalid"))?;

        let destination = required(&headers, &DESTINATION, "destination missing")?;
        let destination = Url::parse(destination)
            .map_err(|_| GatewayError::ClientHeader("destination is not an absolute URL"))?;
        if !matches!(destination.scheme(), "http" | "https") || destination.host_str().is_none() {
            return Err(GatewayError::ClientHeader("destination must be an http(s) URL"));
        }

        if !headers::has_placeholder(&headers) {
            return Err(GatewayError::ClientHeader("no header carries the key placeholder"));
        }

        Ok(Self {
            association_id,
            method,
            destination,
            headers,
            body,
            path: parts.uri.path().to_string(),
        })
    }
}

fn required<'a>(
    headers: &'a HeaderMap,
    name: &HeaderName,
    missing: &'static str,
) -> GatewayResult<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(GatewayError::ClientHeader(missing))
}
