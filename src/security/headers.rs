//! Header handling for proxied requests.
//!
//! # Responsibilities
//! - Name the gateway control headers
//! - Find the client share inside `%PARTIAL_KEY:<share>%`
//! - Inject the reconstructed secret wherever the placeholder appears
//! - Strip control and hop-by-hop headers before forwarding
//!
//! # Design Decisions
//! - The share is the text between the marker and the next `%`
//! - Every placeholder in every header must carry the same share; a request
//!   mixing shares is rejected so no placeholder is forwarded unreplaced
//! - A marker with no closing `%` is not a placeholder and is left alone
//! - Only the literal placeholder is replaced; the rest of the value is kept
//! - Rewritten values are flagged sensitive so they never show up in debug output

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use thiserror::Error;
use zeroize::Zeroizing;

/// Credential identifier.
pub const ASSOCIATION_ID: HeaderName = HeaderName::from_static("association_id");
/// Method to use against the destination.
pub const HTTP_METHOD: HeaderName = HeaderName::from_static("http_method");
/// Absolute destination URL.
pub const DESTINATION: HeaderName = HeaderName::from_static("destination");
/// `device-check`, `play-integrity` or `web`.
pub const VALIDATION_MODE: HeaderName = HeaderName::from_static("validation_mode");
/// Play Integrity token.
pub const PLAY_INTEGRITY_KEY: HeaderName = HeaderName::from_static("x-play-integrity-key");
/// Apple DeviceCheck device token.
pub const APPLE_DEVICE_TOKEN: HeaderName = HeaderName::from_static("x-apple-device-token");

/// Marker opening a client-share placeholder.
pub const PLACEHOLDER_PREFIX: &str = "%PARTIAL_KEY:";
const PLACEHOLDER_SUFFIX: char = '%';

const CONTROL_HEADERS: [HeaderName; 7] = [
    ASSOCIATION_ID,
    HTTP_METHOD,
    DESTINATION,
    VALIDATION_MODE,
    PLAY_INTEGRITY_KEY,
    APPLE_DEVICE_TOKEN,
    header::HOST,
];

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
];

/// True if any header value carries a placeholder marker.
pub fn has_placeholder(headers: &HeaderMap) -> bool {
    headers
        .values()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains(PLACEHOLDER_PREFIX))
}

/// Why no client share could be taken from the headers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error("no well-formed key placeholder")]
    Missing,

    #[error("key placeholders carry different shares")]
    Conflicting,
}

/// Shares of every well-formed placeholder in `value`, in order.
fn placeholder_shares(value: &str) -> impl Iterator<Item = &str> + '_ {
    let mut rest = value;
    std::iter::from_fn(move || loop {
        let start = rest.find(PLACEHOLDER_PREFIX)? + PLACEHOLDER_PREFIX.len();
        let tail = &rest[start..];
        let end = tail.find(PLACEHOLDER_SUFFIX)?;
        rest = &tail[end + 1..];
        if end > 0 {
            return Some(&tail[..end]);
        }
    })
}

/// Pull the client share out of the headers.
///
/// Every well-formed placeholder is inspected; they must all agree.
pub fn extract_client_share(headers: &HeaderMap) -> Result<String, PlaceholderError> {
    let mut found: Option<&str> = None;

    for value in headers.values().filter_map(|v| v.to_str().ok()) {
        for share in placeholder_shares(value) {
            match found {
                None => found = Some(share),
                Some(first) if first != share => return Err(PlaceholderError::Conflicting),
                Some(_) => {}
            }
        }
    }

    found.map(str::to_string).ok_or(PlaceholderError::Missing)
}

/// Replace `%PARTIAL_KEY:<client_share>%` with `secret` in every header.
///
/// Returns the number of header values rewritten.
pub fn inject_secret(
    headers: &mut HeaderMap,
    client_share: &str,
    secret: &str,
) -> Result<usize, InvalidHeaderValue> {
    let placeholder = format!("{}{}{}", PLACEHOLDER_PREFIX, client_share, PLACEHOLDER_SUFFIX);
    let mut rewritten = 0;

    for (_, value) in headers.iter_mut() {
        let Ok(current) = value.to_str() else {
            continue;
        };
        if !current.contains(&placeholder) {
            continue;
        }

        let replaced = Zeroizing::new(current.replace(&placeholder, secret));
        let mut new_value = HeaderValue::from_str(&replaced)?;
        new_value.set_sensitive(true);
        *value = new_value;
        rewritten += 1;
    }

    Ok(rewritten)
}

/// Remove gateway control headers and hop-by-hop headers from a request.
pub fn strip_control_headers(headers: &mut HeaderMap) {
    for name in CONTROL_HEADERS.iter() {
        headers.remove(name);
    }
    strip_hop_by_hop(headers);
}

/// Remove hop-by-hop headers, including any the `Connection` header names.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::UPGRADE);
}
