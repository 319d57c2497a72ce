//! Destination whitelist matching.
//!
//! # Rules
//! - Host must equal an entry's host after URL parsing. The `url` crate
//!   lowercases ASCII hosts on both sides, so host case is ignored
//! - Among entries for that host, the destination path must start with
//!   `entry.path + "/"` or end with `entry.path`
//! - One matching entry is enough; no entries means no destination
//! - Ports are not part of the match

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Error parsing a whitelist entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WhitelistError {
    #[error("whitelist entry '{0}' is not a valid host/path")]
    Invalid(String),

    #[error("whitelist entry '{0}' has no host")]
    MissingHost(String),
}

/// A `(host, path)` pair a credential may be forwarded toward.
///
/// Written in config as `"api.example.com/v1"`; a scheme prefix is tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct WhitelistEntry {
    host: String,
    /// Path without trailing slash; empty allows every path on the host.
    path: String,
}

impl WhitelistEntry {
    /// Parse an entry such as `api.example.com/v1` or `https://api.example.com`.
    pub fn parse(raw: &str) -> Result<Self, WhitelistError> {
        let trimmed = raw.trim();
        let bare = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);

        let url = Url::parse(&format!("http://{}", bare))
            .map_err(|_| WhitelistError::Invalid(raw.to_string()))?;
        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(WhitelistError::MissingHost(raw.to_string())),
        };

        Ok(Self {
            host,
            path: url.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Prefix-with-slash or suffix rule against a destination path.
    pub fn matches_path(&self, path: &str) -> bool {
        path.starts_with(&format!("{}/", self.path)) || path.ends_with(&self.path)
    }
}

impl TryFrom<String> for WhitelistEntry {
    type Error = WhitelistError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WhitelistEntry> for String {
    fn from(entry: WhitelistEntry) -> Self {
        entry.to_string()
    }
}

impl fmt::Display for WhitelistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.host, self.path)
    }
}

/// Returns true if `destination` is allowed by any entry of `whitelist`.
///
/// Hosts are compared in their parsed, lowercased form: `API.EXAMPLE.COM`
/// matches an `api.example.com` entry. Paths stay case-sensitive.
pub fn is_allowed(whitelist: &[WhitelistEntry], destination: &Url) -> bool {
    let Some(host) = destination.host_str() else {
        return false;
    };
    let path = destination.path();

    whitelist
        .iter()
        .filter(|entry| entry.host == host)
        .any(|entry| entry.matches_path(path))
}

/// Returns true if the destination host is on the operator's block list.
pub fn is_blocked(blocked: &[String], destination: &Url) -> bool {
    match destination.host_str() {
        Some(host) => blocked.iter().any(|b| b.eq_ignore_ascii_case(host)),
        None => true,
    }
}
