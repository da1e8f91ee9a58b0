//! Operational endpoints: liveness, readiness, metrics.
//!
//! These sit outside the admission pipeline so they answer even when the
//! gateway is shedding, rate limiting, or every breaker is open.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::http::server::GatewayState;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::BreakerSnapshot;

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub tracked_clients: usize,
}

#[derive(Debug, Serialize)]
pub struct ReadyBody {
    pub ready: bool,
    pub breakers: Vec<BreakerSnapshot>,
}

/// `GET /health`: the process is up.
pub async fn health(State(state): State<GatewayState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        in_flight: state.shedder.current(),
        max_concurrent: state.shedder.max_concurrent(),
        tracked_clients: state.limiter.client_count(),
    })
}

/// `GET /ready`: 503 while any breaker is open and still cooling down.
pub async fn ready(State(state): State<GatewayState>) -> impl IntoResponse {
    let ready = state.breakers.all_closed_or_probing();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyBody {
            ready,
            breakers: state.breakers.snapshot(),
        }),
    )
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn prometheus(State(state): State<GatewayState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(&state.metrics),
    )
}
