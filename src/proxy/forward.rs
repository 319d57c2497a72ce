//! Outbound forwarding.
//!
//! # Responsibilities
//! - Send exactly one request to the destination
//! - Stream the client body out and the upstream body back without buffering
//! - Strip hop-by-hop headers from the upstream response
//!
//! # Design Decisions
//! - Redirects are returned to the client, never followed; a redirect must not
//!   carry the injected secret to a host outside the whitelist
//! - Upstream error statuses pass through unchanged

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use url::Url;

use crate::config::TimeoutConfig;
use crate::proxy::types::{GatewayError, GatewayResult};
use crate::security::headers::strip_hop_by_hop;

pub struct Forwarder {
    http: reqwest::Client,
}

impl Forwarder {
    pub fn new(timeouts: &TimeoutConfig) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.upstream_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(GatewayError::from_reqwest)?;
        Ok(Self { http })
    }

    pub async fn send(
        &self,
        method: Method,
        destination: Url,
        headers: HeaderMap,
        body: Body,
    ) -> GatewayResult<Response> {
        let upstream = self
            .http
            .request(method, destination)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
