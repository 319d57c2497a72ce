//! Credentials file format and loading.
//!
//! ```toml
//! [[projects]]
//! id = "weather-app"
//!
//! [projects.device_check]
//! private_key_path = "keys/AuthKey_ABC123.p8"
//! key_id = "ABC123"
//! team_id = "TEAM42"
//! bypass_token = "3b0c5f0e-8a41-4f0e-9d2a-4d8b2c1f7e6a"
//!
//! [projects.play_integrity]
//! package_name = "com.example.weather"
//! service_account_path = "keys/play-integrity.json"
//! bypass_token = "b7a0c3c2-3d62-4a3e-8f57-0c5b1e2d9f41"
//!
//! [[credentials]]
//! id = "5f6c1d0a-0b7e-4f7e-9a51-1f2d3c4b5a69"
//! project = "weather-app"
//! server_share = "q83vEjRWeJA="
//! whitelist = ["api.openweathermap.org/data/2.5"]
//! rate_limit = 100
//! allows_web = false
//! ```
//!
//! Relative key paths resolve against the directory holding the file.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::EncodingKey;
use serde::Deserialize;

use crate::credentials::model::{
    AppVerdict, AttestationProfile, Credential, DeviceCheckConfig, PlayIntegrityConfig,
    ServiceAccountKey,
};
use crate::credentials::store::StoreError;
use crate::security::whitelist::WhitelistEntry;

/// Shortest bypass token accepted.
pub const MIN_BYPASS_TOKEN_LEN: usize = 16;

/// Resolved credentials keyed by id.
pub type CredentialMap = HashMap<String, Arc<Credential>>;

/// Raw credentials document.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsDocument {
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
    #[serde(default)]
    pub credentials: Vec<CredentialEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectEntry {
    pub id: String,
    pub device_check: Option<DeviceCheckEntry>,
    pub play_integrity: Option<PlayIntegrityEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceCheckEntry {
    pub private_key: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub key_id: String,
    pub team_id: String,
    pub bypass_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayIntegrityEntry {
    pub package_name: String,
    /// Inline service-account JSON.
    pub service_account: Option<String>,
    pub service_account_path: Option<PathBuf>,
    pub bypass_token: String,
    #[serde(default)]
    pub allowed_app_verdicts: Vec<AppVerdict>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialEntry {
    pub id: String,
    pub project: Option<String>,
    pub server_share: String,
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Negative values mean unlimited.
    pub rate_limit: Option<i64>,
    #[serde(default)]
    pub allows_web: bool,
}

/// Read, parse and resolve a credentials file.
pub fn load_credentials(path: &Path) -> Result<CredentialMap, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document: CredentialsDocument = toml::from_str(&content)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    document.resolve(base_dir)
}

impl CredentialsDocument {
    /// Validate the whole document and build credential records.
    ///
    /// Every problem is collected; nothing is returned unless all entries are valid.
    pub fn resolve(self, base_dir: &Path) -> Result<CredentialMap, StoreError> {
        let mut errors = Vec::new();
        let mut profiles: HashMap<String, Arc<AttestationProfile>> = HashMap::new();

        for project in self.projects {
            if profiles.contains_key(&project.id) {
                errors.push(format!("duplicate project id '{}'", project.id));
                continue;
            }
            let device_check = project
                .device_check
                .and_then(|entry| collect(resolve_device_check(&project.id, entry, base_dir), &mut errors));
            let play_integrity = project
                .play_integrity
                .and_then(|entry| collect(resolve_play_integrity(&project.id, entry, base_dir), &mut errors));

            profiles.insert(
                project.id.clone(),
                Arc::new(AttestationProfile {
                    project_id: project.id,
                    device_check,
                    play_integrity,
                }),
            );
        }

        let mut credentials = CredentialMap::new();
        for entry in self.credentials {
            if credentials.contains_key(&entry.id) {
                errors.push(format!("duplicate credential id '{}'", entry.id));
                continue;
            }
            if let Some(credential) = collect(resolve_credential(entry, &profiles), &mut errors) {
                credentials.insert(credential.id.clone(), Arc::new(credential));
            }
        }

        if errors.is_empty() {
            Ok(credentials)
        } else {
            Err(StoreError::Invalid(errors))
        }
    }
}

fn collect<T>(result: Result<T, String>, errors: &mut Vec<String>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

fn resolve_credential(
    entry: CredentialEntry,
    profiles: &HashMap<String, Arc<AttestationProfile>>,
) -> Result<Credential, String> {
    if entry.id.trim().is_empty() {
        return Err("credential id must not be empty".to_string());
    }
    if STANDARD.decode(&entry.server_share).is_err() {
        return Err(format!("credential '{}': server_share is not valid base64", entry.id));
    }

    let whitelist = entry
        .whitelist
        .iter()
        .map(|raw| WhitelistEntry::parse(raw))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("credential '{}': {}", entry.id, e))?;

    let attestation = match &entry.project {
        Some(project) => Some(
            profiles
                .get(project)
                .cloned()
                .ok_or_else(|| format!("credential '{}': unknown project '{}'", entry.id, project))?,
        ),
        None => None,
    };

    let rate_limit = match entry.rate_limit {
        Some(n) if n < 0 => None,
        Some(n) => Some(
            u32::try_from(n).map_err(|_| format!("credential '{}': rate_limit too large", entry.id))?,
        ),
        None => None,
    };

    Ok(Credential {
        id: entry.id,
        server_share: entry.server_share,
        whitelist,
        rate_limit,
        allows_web: entry.allows_web,
        attestation,
    })
}

fn resolve_device_check(
    project: &str,
    entry: DeviceCheckEntry,
    base_dir: &Path,
) -> Result<DeviceCheckConfig, String> {
    let private_key = inline_or_file(
        entry.private_key,
        entry.private_key_path,
        base_dir,
        &format!("project '{}': device_check private key", project),
    )?;
    EncodingKey::from_ec_pem(private_key.as_bytes())
        .map_err(|e| format!("project '{}': device_check key is not an EC PEM: {}", project, e))?;
    check_bypass_token(project, "device_check", &entry.bypass_token)?;

    Ok(DeviceCheckConfig {
        private_key,
        key_id: entry.key_id,
        team_id: entry.team_id,
        bypass_token: entry.bypass_token,
    })
}

fn resolve_play_integrity(
    project: &str,
    entry: PlayIntegrityEntry,
    base_dir: &Path,
) -> Result<PlayIntegrityConfig, String> {
    let raw = inline_or_file(
        entry.service_account,
        entry.service_account_path,
        base_dir,
        &format!("project '{}': play_integrity service account", project),
    )?;
    let service_account: ServiceAccountKey = serde_json::from_str(&raw)
        .map_err(|e| format!("project '{}': invalid service account JSON: {}", project, e))?;
    EncodingKey::from_rsa_pem(service_account.private_key.as_bytes())
        .map_err(|e| format!("project '{}': service account key is not an RSA PEM: {}", project, e))?;
    check_bypass_token(project, "play_integrity", &entry.bypass_token)?;
    if entry.package_name.trim().is_empty() {
        return Err(format!("project '{}': play_integrity package_name is empty", project));
    }

    let allowed_app_verdicts = if entry.allowed_app_verdicts.is_empty() {
        AppVerdict::default_allowed()
    } else {
        entry.allowed_app_verdicts.into_iter().collect::<HashSet<_>>()
    };

    Ok(PlayIntegrityConfig {
        package_name: entry.package_name,
        service_account,
        bypass_token: entry.bypass_token,
        allowed_app_verdicts,
    })
}

fn inline_or_file(
    inline: Option<String>,
    path: Option<PathBuf>,
    base_dir: &Path,
    what: &str,
) -> Result<String, String> {
    match (inline, path) {
        (Some(value), None) => Ok(value),
        (None, Some(path)) => {
            let full = if path.is_absolute() { path } else { base_dir.join(path) };
            fs::read_to_string(&full).map_err(|e| format!("{}: cannot read {:?}: {}", what, full, e))
        }
        (Some(_), Some(_)) => Err(format!("{}: set either the inline value or the path, not both", what)),
        (None, None) => Err(format!("{}: missing", what)),
    }
}

fn check_bypass_token(project: &str, section: &str, token: &str) -> Result<(), String> {
    if token.chars().count() < MIN_BYPASS_TOKEN_LEN {
        return Err(format!(
            "project '{}': {} bypass_token must be at least {} characters",
            project, section, MIN_BYPASS_TOKEN_LEN
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(doc: &str) -> Result<CredentialMap, StoreError> {
        let document: CredentialsDocument = toml::from_str(doc).unwrap();
        document.resolve(Path::new("."))
    }

    #[test]
    fn test_minimal_credential() {
        let map = parse(
            r#"
            [[credentials]]
            id = "c1"
            server_share = "q83vEjRWeJA="
            whitelist = ["api.example.com/v1"]
            rate_limit = 10
            allows_web = true
            "#,
        )
        .unwrap();

        let c = map.get("c1").unwrap();
        assert_eq!(c.rate_limit, Some(10));
        assert!(c.allows_web);
        assert_eq!(c.whitelist.len(), 1);
        assert!(c.attestation.is_none());
    }

    #[test]
    fn test_negative_rate_limit_is_unlimited() {
        let map = parse(
            r#"
            [[credentials]]
            id = "c1"
            server_share = "AAAA"
            rate_limit = -1
            "#,
        )
        .unwrap();
        assert_eq!(map["c1"].rate_limit, None);
    }

    #[test]
    fn test_collects_every_error() {
        let err = parse(
            r#"
            [[credentials]]
            id = "bad-share"
            server_share = "not base64!"

            [[credentials]]
            id = "bad-project"
            project = "missing"
            server_share = "AAAA"

            [[credentials]]
            id = "bad-whitelist"
            server_share = "AAAA"
            whitelist = ["http://"]
            "#,
        )
        .unwrap_err();

        match err {
            StoreError::Invalid(errors) => {
                assert_eq!(errors.len(), 3);
                assert!(errors[0].contains("bad-share"));
                assert!(errors[1].contains("unknown project"));
                assert!(errors[2].contains("bad-whitelist"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = parse(
            r#"
            [[credentials]]
            id = "c1"
            server_share = "AAAA"

            [[credentials]]
            id = "c1"
            server_share = "AAAA"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate credential id"));
    }

    #[test]
    fn test_missing_device_check_key_reported() {
        let err = parse(
            r#"
            [[projects]]
            id = "p1"
            [projects.device_check]
            key_id = "KID"
            team_id = "TEAM"
            bypass_token = "0123456789abcdef0123"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("device_check private key: missing"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<CredentialsDocument, _> = toml::from_str(
            r#"
            [[credentials]]
            id = "c1"
            server_share = "AAAA"
            rate_limt = 5
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_short_bypass_token_rejected() {
        assert!(check_bypass_token("p", "device_check", "short").is_err());
        assert!(check_bypass_token("p", "device_check", "0123456789abcdef").is_ok());
    }
}
