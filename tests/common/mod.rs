//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    body::Bytes,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use game_gateway::config::BackendConfig;
use game_gateway::security::auth::Claims;
use game_gateway::{Gateway, GatewayConfig, Shutdown, ShutdownOutcome};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const SECRET: &str = "integration-secret";

/// Serve `app` on an ephemeral port.
pub async fn spawn_backend(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Backend that reflects the request it received as JSON.
pub async fn start_echo_backend() -> SocketAddr {
    spawn_backend(Router::new().fallback(echo)).await
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let headers: serde_json::Map<String, Value> = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), Value::from(v))))
        .collect();
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Backend whose status is chosen per call; returns the shared call counter.
pub async fn start_programmable_backend<F>(f: F) -> (SocketAddr, Arc<AtomicU32>)
where
    F: Fn(u32) -> StatusCode + Clone + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let app = Router::new().fallback(move || {
        let f = f.clone();
        let counter = counter.clone();
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            (f(n), "programmed").into_response()
        }
    });
    (spawn_backend(app).await, calls)
}

/// Backend that holds every request for `delay` before answering 200.
pub async fn start_slow_backend(delay: Duration) -> (SocketAddr, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let app = Router::new().fallback(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            "slow"
        }
    });
    (spawn_backend(app).await, calls)
}

/// Config with generous admission limits and the given backends.
pub fn gateway_config(backends: &[(&str, String)]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.jwt_secret = SECRET.into();
    config.rate_limit.requests_per_minute = 60_000;
    config.rate_limit.burst_limit = 10_000;
    config.timeouts.shutdown_secs = 5;
    config.backends = backends
        .iter()
        .map(|(name, url)| BackendConfig {
            name: name.to_string(),
            url: url.clone(),
            timeout_ms: None,
        })
        .collect();
    config
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<ShutdownOutcome>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Run a gateway on an ephemeral port until its `shutdown` is triggered.
pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let gateway = Gateway::new(config);

    let signal = shutdown.clone();
    let handle = tokio::spawn(async move { gateway.run(listener, &signal).await });
    // Let the server subscribe to shutdown before tests can trigger it.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestGateway {
        addr,
        shutdown,
        handle,
    }
}

pub fn token(sub: &str) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let claims = Claims {
        sub: sub.to_string(),
        exp: now + 3600,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// GET `path` on the gateway with a valid bearer token.
pub async fn authed_get(gateway: &TestGateway, path: &str) -> reqwest::Response {
    client()
        .get(gateway.url(path))
        .bearer_auth(token("player-1"))
        .send()
        .await
        .unwrap()
}
