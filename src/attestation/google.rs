//! Signed Google API clients for Play Integrity.
//!
//! # Responsibilities
//! - Exchange a service-account JWT for an OAuth access token
//! - Cache the access token until shortly before it expires
//! - Call `decodeIntegrityToken`
//! - Keep one client per Google Cloud project, evicted by TTL and size cap

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::attestation::{AttestationError, AttestationResult};
use crate::credentials::{AppVerdict, ServiceAccountKey};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// Refresh access tokens this long before Google says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Serialize)]
struct DecodeIntegrityTokenRequest<'a> {
    integrity_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecodeIntegrityTokenResponse {
    token_payload_external: TokenPayload,
}

/// The decoded integrity verdicts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    #[serde(default)]
    pub app_integrity: AppIntegrity,
    #[serde(default)]
    pub device_integrity: DeviceIntegrity,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIntegrity {
    pub app_recognition_verdict: Option<AppVerdict>,
    pub package_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIntegrity {
    #[serde(default)]
    pub device_recognition_verdict: Vec<String>,
}

struct AccessToken {
    value: Zeroizing<String>,
    expires_at: Instant,
}

/// A Google API client authenticated as one service account.
pub struct GoogleServiceClient {
    account: ServiceAccountKey,
    key: EncodingKey,
    scope: String,
    http: reqwest::Client,
    token: Mutex<Option<AccessToken>>,
}

impl GoogleServiceClient {
    pub fn new(account: ServiceAccountKey, scope: &str, http: reqwest::Client) -> AttestationResult<Self> {
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| AttestationError::Key(e.to_string()))?;
        Ok(Self {
            account,
            key,
            scope: scope.to_string(),
            http,
            token: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.account.client_email
    }

    /// A valid access token, fetching a new one if the cached token is stale.
    async fn access_token(&self) -> AttestationResult<Zeroizing<String>> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch_access_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn fetch_access_token(&self) -> AttestationResult<AccessToken> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            scope: &self.scope,
            aud: &self.account.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.account.private_key_id.clone();

        let assertion = jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| AttestationError::Key(e.to_string()))?;

        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(AttestationError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(AttestationError::Upstream(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await.map_err(AttestationError::from_reqwest)?;
        tracing::debug!(
            project = %self.account.project_id,
            expires_in = token.expires_in,
            "Fetched Google access token"
        );

        Ok(AccessToken {
            value: Zeroizing::new(token.access_token),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    /// Ask Google to decode an integrity token issued for `package_name`.
    pub async fn decode_integrity_token(
        &self,
        api_base: &str,
        package_name: &str,
        integrity_token: &str,
    ) -> AttestationResult<TokenPayload> {
        let access_token = self.access_token().await?;
        let url = format!(
            "{}/v1/{}:decodeIntegrityToken",
            api_base.trim_end_matches('/'),
            package_name
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(access_token.as_str())
            .json(&DecodeIntegrityTokenRequest { integrity_token })
            .send()
            .await
            .map_err(AttestationError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(AttestationError::Upstream(format!(
                "decodeIntegrityToken returned {}",
                response.status()
            )));
        }

        let decoded: DecodeIntegrityTokenResponse =
            response.json().await.map_err(AttestationError::from_reqwest)?;
        Ok(decoded.token_payload_external)
    }
}

struct CachedClient {
    client: Arc<GoogleServiceClient>,
    created_at: Instant,
}

/// Google clients keyed by Cloud project id.
pub struct ClientCache {
    clients: DashMap<String, CachedClient>,
    http: reqwest::Client,
    scope: String,
    capacity: usize,
    ttl: Duration,
}

impl ClientCache {
    pub fn new(http: reqwest::Client, scope: &str, capacity: usize, ttl: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            http,
            scope: scope.to_string(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Fetch the client for `account.project_id`, creating it on first use or after expiry.
    pub fn get_or_create(&self, account: &ServiceAccountKey) -> AttestationResult<Arc<GoogleServiceClient>> {
        let now = Instant::now();
        if let Some(client) = self.lookup(account, now) {
            return Ok(client);
        }

        let client = Arc::new(GoogleServiceClient::new(account.clone(), &self.scope, self.http.clone())?);
        self.evict(now);
        self.clients.insert(
            account.project_id.clone(),
            CachedClient {
                client: client.clone(),
                created_at: now,
            },
        );
        tracing::debug!(project = %account.project_id, cached = self.clients.len(), "Created Google client");
        Ok(client)
    }

    fn lookup(&self, account: &ServiceAccountKey, now: Instant) -> Option<Arc<GoogleServiceClient>> {
        let entry = self.clients.get(&account.project_id)?;
        let fresh = now.saturating_duration_since(entry.created_at) < self.ttl;
        // a rotated service account for the same project gets a new client
        let same_account = entry.client.account.client_email == account.client_email
            && entry.client.account.private_key == account.private_key;
        (fresh && same_account).then(|| entry.client.clone())
    }

    /// Drop expired clients, then the oldest ones until there is room for one more.
    fn evict(&self, now: Instant) {
        self.clients
            .retain(|_, cached| now.saturating_duration_since(cached.created_at) < self.ttl);

        while self.clients.len() >= self.capacity {
            let oldest = self
                .clients
                .iter()
                .min_by_key(|entry| entry.created_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.clients.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, project_id: &str) -> bool {
        self.clients.contains_key(project_id)
    }
}
