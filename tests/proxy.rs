//! Reverse proxy behaviour and gateway lifecycle.

use std::time::Duration;

use game_gateway::ShutdownOutcome;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

#[tokio::test]
async fn forwards_method_body_headers_and_query() {
    let backend = common::start_echo_backend().await;
    let gateway =
        common::spawn_gateway(common::gateway_config(&[("combat", format!("http://{backend}"))]))
            .await;

    let res = common::client()
        .post(gateway.url("/api/v1/combat/sessions/42/attack?q=1"))
        .bearer_auth(common::token("player-9"))
        .header("x-combo", "triple")
        .header("x-user-id", "spoofed")
        .body("{\"target\":7}")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let echoed: Value = res.json().await.unwrap();
    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["path"], "/sessions/42/attack");
    assert_eq!(echoed["query"], "q=1");
    assert_eq!(echoed["body"], "{\"target\":7}");

    let headers = &echoed["headers"];
    assert_eq!(headers["x-combo"], "triple");
    assert_eq!(headers["x-user-id"], "player-9");
    assert_eq!(headers["x-gateway"], "game-gateway");
    assert_eq!(headers["x-forwarded-for"], "127.0.0.1");
    assert_eq!(headers["x-real-ip"], "127.0.0.1");
    assert_eq!(headers["x-forwarded-proto"], "http");
    assert!(headers["x-request-id"].is_string());
}

#[tokio::test]
async fn trusted_forwarded_chain_gets_socket_peer_appended() {
    let backend = common::start_echo_backend().await;
    let mut config = common::gateway_config(&[("combat", format!("http://{backend}"))]);
    config.security.trust_forwarded_headers = true;
    let gateway = common::spawn_gateway(config).await;

    let res = common::client()
        .get(gateway.url("/api/v1/combat/ping"))
        .bearer_auth(common::token("player-1"))
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let echoed: Value = res.json().await.unwrap();
    assert_eq!(echoed["headers"]["x-forwarded-for"], "203.0.113.9, 127.0.0.1");
    assert_eq!(echoed["headers"]["x-real-ip"], "203.0.113.9");
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let backend = common::start_echo_backend().await;
    let gateway =
        common::spawn_gateway(common::gateway_config(&[("loot", format!("http://{backend}"))]))
            .await;

    let res = common::client()
        .get(gateway.url("/api/v1/loot/drops"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["kind"], "Unauthorized");

    let res = common::client()
        .get(gateway.url("/api/v1/loot/drops"))
        .bearer_auth("not.a.jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn public_paths_skip_auth() {
    let backend = common::start_echo_backend().await;
    let mut config = common::gateway_config(&[("auth", format!("http://{backend}"))]);
    config.auth.public_paths = vec!["/api/v1/auth".into()];
    let gateway = common::spawn_gateway(config).await;

    let res = common::client()
        .post(gateway.url("/api/v1/auth/login"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let echoed: Value = res.json().await.unwrap();
    assert_eq!(echoed["path"], "/login");
    assert!(echoed["headers"].get("x-user-id").is_none());
}

#[tokio::test]
async fn misconfigured_route_fails_fast_and_unknown_route_is_404() {
    let gateway = common::spawn_gateway(common::gateway_config(&[(
        "analytics",
        "ftp://nowhere".to_string(),
    )]))
    .await;

    let res = common::authed_get(&gateway, "/api/v1/analytics/report").await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["kind"], "BadGateway");

    let res = common::authed_get(&gateway, "/api/v1/unknown/x").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn slow_backend_times_out_and_counts_as_failure() {
    let (backend, _) = common::start_slow_backend(Duration::from_millis(500)).await;
    let mut config = common::gateway_config(&[("ai", format!("http://{backend}"))]);
    config.backends[0].timeout_ms = Some(50);
    config.circuit_breaker.failure_threshold = 1;
    let gateway = common::spawn_gateway(config).await;

    let res = common::authed_get(&gateway, "/api/v1/ai/plan").await;
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["kind"], "Timeout");

    let res = common::authed_get(&gateway, "/api/v1/ai/plan").await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn request_deadline_caps_route_timeout() {
    let (backend, _) = common::start_slow_backend(Duration::from_secs(3)).await;
    let mut config = common::gateway_config(&[("trade", format!("http://{backend}"))]);
    config.backends[0].timeout_ms = Some(10_000);
    config.timeouts.write_secs = 1;
    config.circuit_breaker.failure_threshold = 1;
    let gateway = common::spawn_gateway(config).await;

    let res = common::authed_get(&gateway, "/api/v1/trade/offers").await;
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["kind"], "Timeout");
    assert_eq!(body["code"], 504);

    let res = common::authed_get(&gateway, "/api/v1/trade/offers").await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["kind"], "CircuitOpen");
}

#[tokio::test]
async fn oversized_streamed_body_does_not_trip_breaker() {
    let backend = common::start_echo_backend().await;
    let mut config = common::gateway_config(&[("upload", format!("http://{backend}"))]);
    config.security.max_body_size = 16;
    config.circuit_breaker.failure_threshold = 1;
    let gateway = common::spawn_gateway(config).await;

    // Chunked, so the size is only discovered while streaming to the backend.
    let chunk = "x".repeat(4096);
    let request = format!(
        "POST /api/v1/upload/replay HTTP/1.1\r\n\
         host: {addr}\r\n\
         authorization: Bearer {token}\r\n\
         transfer-encoding: chunked\r\n\
         connection: close\r\n\r\n\
         {len:x}\r\n{chunk}\r\n0\r\n\r\n",
        addr = gateway.addr,
        token = common::token("player-1"),
        len = chunk.len(),
    );
    let mut stream = TcpStream::connect(gateway.addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    let _ = stream.read_to_end(&mut raw).await;
    let raw = String::from_utf8_lossy(&raw);
    assert!(raw.starts_with("HTTP/1.1 413"), "unexpected response: {raw}");

    let res = common::authed_get(&gateway, "/api/v1/upload/status").await;
    assert_eq!(res.status(), StatusCode::OK);
    let echoed: Value = res.json().await.unwrap();
    assert_eq!(echoed["path"], "/status");
}

#[tokio::test]
async fn unreachable_backend_is_bad_gateway() {
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let gateway =
        common::spawn_gateway(common::gateway_config(&[("ws", format!("http://{addr}"))])).await;

    let res = common::authed_get(&gateway, "/api/v1/ws/connect").await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn metrics_endpoint_exposes_gateway_families() {
    let backend = common::start_echo_backend().await;
    let gateway =
        common::spawn_gateway(common::gateway_config(&[("combat", format!("http://{backend}"))]))
            .await;
    common::authed_get(&gateway, "/api/v1/combat/ping").await;

    let res = common::client().get(gateway.url("/metrics")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let text = res.text().await.unwrap();
    assert!(text.contains("gateway_requests_total"));
    assert!(text.contains("gateway_circuit_breaker_state"));
}

#[tokio::test]
async fn shutdown_drains_in_flight_requests() {
    let (backend, _) = common::start_slow_backend(Duration::from_millis(300)).await;
    let gateway =
        common::spawn_gateway(common::gateway_config(&[("chat", format!("http://{backend}"))]))
            .await;

    let url = gateway.url("/api/v1/chat/history");
    let in_flight = tokio::spawn(async move {
        common::client()
            .get(url)
            .bearer_auth(common::token("p"))
            .send()
            .await
            .unwrap()
            .status()
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    gateway.shutdown.trigger();
    assert_eq!(in_flight.await.unwrap(), StatusCode::OK);
    assert_eq!(gateway.handle.await.unwrap().unwrap(), ShutdownOutcome::Graceful);
}

#[tokio::test]
async fn drain_deadline_reports_timeout() {
    let (backend, _) = common::start_slow_backend(Duration::from_secs(5)).await;
    let mut config = common::gateway_config(&[("stock", format!("http://{backend}"))]);
    config.backends[0].timeout_ms = Some(10_000);
    config.timeouts.shutdown_secs = 1;
    let gateway = common::spawn_gateway(config).await;

    let url = gateway.url("/api/v1/stock/tick");
    let _stuck = tokio::spawn(async move {
        let _ = common::client()
            .get(url)
            .bearer_auth(common::token("p"))
            .send()
            .await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    gateway.shutdown.trigger();
    assert_eq!(gateway.handle.await.unwrap().unwrap(), ShutdownOutcome::TimedOut);
}
