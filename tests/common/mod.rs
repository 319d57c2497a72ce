//! Shared utilities for integration testing.
//!
//! Every server binds 127.0.0.1:0, so tests never fight over ports.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, Method, Request, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use keyshare_proxy::attestation::AttestationVerifier;
use keyshare_proxy::config::GatewayConfig;
use keyshare_proxy::credentials::{
    AppVerdict, AttestationProfile, Credential, DeviceCheckConfig, PlayIntegrityConfig,
    ServiceAccountKey, StaticCredentialStore,
};
use keyshare_proxy::proxy::Forwarder;
use keyshare_proxy::security::{RateLimiter, WhitelistEntry};
use keyshare_proxy::usage::UsageTally;
use keyshare_proxy::{HttpServer, ProxyGateway, Shutdown};

pub const APPLE_KEY: &str = include_str!("../fixtures/apple_device_check.p8");
pub const GOOGLE_KEY: &str = include_str!("../fixtures/google_service_account.pem");

pub const DEVICE_BYPASS: &str = "dc-bypass-7f3a9c1e5b2d4f60";
pub const PLAY_BYPASS: &str = "pi-bypass-0b1c2d3e4f5a6b7c";
pub const GOOD_DEVICE_TOKEN: &str = "good-device-token";
pub const GOOD_INTEGRITY_TOKEN: &str = "good-integrity-token";
pub const ROOTED_INTEGRITY_TOKEN: &str = "rooted-integrity-token";
pub const SIDELOADED_INTEGRITY_TOKEN: &str = "sideloaded-integrity-token";
pub const PACKAGE_NAME: &str = "com.example.weather";
pub const GOOGLE_ACCESS_TOKEN: &str = "ya29.test-access-token";

/// Serve `router` on an ephemeral port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// A request as the upstream saw it.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Destination API that records every request and answers with a fixed status.
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        Self::start_with_status(StatusCode::OK).await
    }

    pub async fn start_with_status(status: StatusCode) -> Self {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let state = (captured.clone(), status);
        let router = Router::new().fallback(record).with_state(state);
        let addr = serve(router).await;
        Self { addr, captured }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }
}

async fn record(
    State((captured, status)): State<(Arc<Mutex<Vec<Captured>>>, StatusCode)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    captured.lock().unwrap().push(Captured {
        method: method.clone(),
        path: uri.path().to_string(),
        headers,
        body: body.clone(),
    });
    (
        status,
        [("x-upstream", "mock")],
        Json(json!({ "method": method.as_str(), "path": uri.path(), "bytes": body.len() })),
    )
}

/// Apple `validate_device_token` stand-in.
#[derive(Clone)]
pub struct MockApple {
    pub addr: SocketAddr,
    pub calls: Arc<AtomicUsize>,
}

impl MockApple {
    pub async fn start() -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/v1/validate_device_token", post(validate_device_token))
            .with_state(calls.clone());
        let addr = serve(router).await;
        Self { addr, calls }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/v1/validate_device_token", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn validate_device_token(
    State(calls): State<Arc<AtomicUsize>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    calls.fetch_add(1, Ordering::SeqCst);

    let Some(jwt) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return StatusCode::UNAUTHORIZED;
    };
    let Ok(header) = jsonwebtoken::decode_header(jwt) else {
        return StatusCode::UNAUTHORIZED;
    };
    if header.alg != jsonwebtoken::Algorithm::ES256 || header.kid.as_deref() != Some("KEY123") {
        return StatusCode::UNAUTHORIZED;
    }
    if body["transaction_id"].as_str().is_none() || body["timestamp"].as_u64().is_none() {
        return StatusCode::BAD_REQUEST;
    }

    match body["device_token"].as_str() {
        Some(GOOD_DEVICE_TOKEN) => StatusCode::OK,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Google OAuth token endpoint and Play Integrity API stand-in.
#[derive(Clone)]
pub struct MockGoogle {
    pub addr: SocketAddr,
    pub token_requests: Arc<AtomicUsize>,
    pub decode_requests: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct GoogleState {
    token_requests: Arc<AtomicUsize>,
    decode_requests: Arc<AtomicUsize>,
}

impl MockGoogle {
    pub async fn start() -> Self {
        let state = GoogleState {
            token_requests: Arc::new(AtomicUsize::new(0)),
            decode_requests: Arc::new(AtomicUsize::new(0)),
        };
        let router = Router::new()
            .route("/token", post(issue_token))
            .route("/v1/{action}", post(decode_integrity_token))
            .with_state(state.clone());
        let addr = serve(router).await;
        Self {
            addr,
            token_requests: state.token_requests,
            decode_requests: state.decode_requests,
        }
    }

    pub fn api_base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn token_uri(&self) -> String {
        format!("http://{}/token", self.addr)
    }
}

async fn issue_token(
    State(state): State<GoogleState>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    state.token_requests.fetch_add(1, Ordering::SeqCst);

    let grant_ok = form.get("grant_type").map(String::as_str)
        == Some("urn:ietf:params:oauth:grant-type:jwt-bearer");
    let assertion_ok = form
        .get("assertion")
        .and_then(|jwt| jsonwebtoken::decode_header(jwt).ok())
        .is_some_and(|h| h.alg == jsonwebtoken::Algorithm::RS256);

    if !(grant_ok && assertion_ok) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_grant" })));
    }
    (
        StatusCode::OK,
        Json(json!({ "access_token": GOOGLE_ACCESS_TOKEN, "expires_in": 3600, "token_type": "Bearer" })),
    )
}

async fn decode_integrity_token(
    State(state): State<GoogleState>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.decode_requests.fetch_add(1, Ordering::SeqCst);

    let expected_auth = format!("Bearer {}", GOOGLE_ACCESS_TOKEN);
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected_auth.as_str()) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    let Some(package) = action.strip_suffix(":decodeIntegrityToken") else {
        return (StatusCode::NOT_FOUND, Json(json!({})));
    };

    let (app_verdict, device_verdict) = match body["integrity_token"].as_str() {
        Some(GOOD_INTEGRITY_TOKEN) => ("PLAY_RECOGNIZED", json!(["MEETS_DEVICE_INTEGRITY"])),
        Some(ROOTED_INTEGRITY_TOKEN) => ("PLAY_RECOGNIZED", json!([])),
        Some(SIDELOADED_INTEGRITY_TOKEN) => ("UNRECOGNIZED_VERSION", json!(["MEETS_DEVICE_INTEGRITY"])),
        _ => return (StatusCode::BAD_REQUEST, Json(json!({ "error": "INVALID_ARGUMENT" }))),
    };

    (
        StatusCode::OK,
        Json(json!({
            "tokenPayloadExternal": {
                "requestDetails": { "requestPackageName": package },
                "appIntegrity": { "appRecognitionVerdict": app_verdict, "packageName": package },
                "deviceIntegrity": { "deviceRecognitionVerdict": device_verdict },
            }
        })),
    )
}

/// A credential with the given whitelist and no attestation profile.
pub fn credential(id: &str, server_share: &str, whitelist: &[&str]) -> Credential {
    Credential {
        id: id.to_string(),
        server_share: server_share.to_string(),
        whitelist: whitelist.iter().map(|w| WhitelistEntry::parse(w).unwrap()).collect(),
        rate_limit: None,
        allows_web: false,
        attestation: None,
    }
}

/// An attestation profile signing with the test fixtures.
pub fn attestation_profile(google: Option<&MockGoogle>) -> Arc<AttestationProfile> {
    let token_uri = google
        .map(MockGoogle::token_uri)
        .unwrap_or_else(|| "http://127.0.0.1:9/token".to_string());
    Arc::new(AttestationProfile {
        project_id: "weather-app".into(),
        device_check: Some(DeviceCheckConfig {
            private_key: APPLE_KEY.into(),
            key_id: "KEY123".into(),
            team_id: "TEAM42".into(),
            bypass_token: DEVICE_BYPASS.into(),
        }),
        play_integrity: Some(PlayIntegrityConfig {
            package_name: PACKAGE_NAME.into(),
            service_account: ServiceAccountKey {
                client_email: "integrity@weather-app.iam.gserviceaccount.com".into(),
                private_key: GOOGLE_KEY.into(),
                project_id: "weather-app".into(),
                token_uri,
                private_key_id: Some("google-key-1".into()),
            },
            bypass_token: PLAY_BYPASS.into(),
            allowed_app_verdicts: AppVerdict::default_allowed(),
        }),
    })
}

/// A gateway listening on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<ProxyGateway>,
    pub usage: Arc<UsageTally>,
    pub store: Arc<StaticCredentialStore>,
    shutdown: Shutdown,
}

impl TestGateway {
    pub async fn start(config: GatewayConfig, credentials: Vec<Credential>) -> Self {
        let store = Arc::new(StaticCredentialStore::new(credentials));
        let usage = Arc::new(UsageTally::new());
        let gateway = ProxyGateway::new(
            store.clone(),
            RateLimiter::new(Duration::from_secs(config.rate_limit.window_secs)),
            AttestationVerifier::new(&config.attestation, &config.timeouts).unwrap(),
            Forwarder::new(&config.timeouts).unwrap(),
            usage.clone(),
        )
        .with_blocked_destinations(config.security.blocked_destinations.clone());
        let gateway = Arc::new(gateway);

        let shutdown = Shutdown::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HttpServer::new(config, gateway.clone());
        let server_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, server_shutdown).await;
        });

        Self {
            addr,
            gateway,
            usage,
            store,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// A proxy call with the control headers filled in.
    pub fn proxy(
        &self,
        association_id: &str,
        mode: &str,
        method: &str,
        destination: &str,
        client_share: &str,
    ) -> reqwest::RequestBuilder {
        client()
            .post(self.url("/proxy"))
            .header("association_id", association_id)
            .header("http_method", method)
            .header("destination", destination)
            .header("validation_mode", mode)
            .header("authorization", format!("Bearer %PARTIAL_KEY:{}%", client_share))
    }

    /// Usage events are recorded on a spawned task; wait for them to land.
    pub async fn wait_for_usage(&self, credential_id: &str, expected: u64) -> u64 {
        for _ in 0..50 {
            let count = self.usage.count(credential_id);
            if count >= expected {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.usage.count(credential_id)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config pointing the attestation clients at local mocks.
pub fn test_config(apple: Option<&MockApple>, google: Option<&MockGoogle>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.observability.metrics_enabled = false;
    if let Some(apple) = apple {
        config.attestation.device_check.endpoint = apple.endpoint();
    } else {
        config.attestation.device_check.endpoint = "http://127.0.0.1:9/v1/validate_device_token".into();
    }
    if let Some(google) = google {
        config.attestation.play_integrity.api_base = google.api_base();
    } else {
        config.attestation.play_integrity.api_base = "http://127.0.0.1:9".into();
    }
    config
}

/// Build a raw request for the in-process router.
pub fn raw_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}
