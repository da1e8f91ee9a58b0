//! Request pipeline middleware.
//!
//! Each function here is an axum `from_fn` middleware that either passes the
//! request on or short-circuits with a [`GatewayError`] response.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::GatewayError;
use crate::http::server::GatewayState;
use crate::observability::metrics;
use crate::resilience::LoadShedder;
use crate::security::headers::{X_FORWARDED_FOR, X_REAL_IP};
use crate::security::UserContext;

/// Resolved address of the calling client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Work out who is calling. Forwarding headers are only consulted when the
/// gateway sits behind a trusted load balancer.
pub fn resolve_client_ip<B>(request: &Request<B>, trust_forwarded: bool) -> IpAddr {
    if trust_forwarded {
        let forwarded = request
            .headers()
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|chain| chain.split(',').next())
            .and_then(|first| first.trim().parse().ok());
        let real_ip = || {
            request
                .headers()
                .get(&X_REAL_IP)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        };
        if let Some(ip) = forwarded.or_else(real_ip) {
            return ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Attach [`ClientIp`] for later stages.
pub async fn client_ip_middleware(
    State(state): State<GatewayState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let ip = resolve_client_ip(&request, state.trust_forwarded);
    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}

/// Per-client token bucket admission.
///
/// Clients presenting a valid token are limited per user; everyone else per
/// source IP. A verified identity is kept on the request so the auth stage
/// does not decode the token again.
pub async fn rate_limit_middleware(
    State(state): State<GatewayState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let key = match state.auth.verify(request.headers()) {
        Ok(user) => {
            let key = format!("user:{}", user.user_id);
            request.extensions_mut().insert(user);
            key
        }
        Err(_) => {
            let ip = match request.extensions().get::<ClientIp>() {
                Some(ClientIp(ip)) => *ip,
                None => resolve_client_ip(&request, state.trust_forwarded),
            };
            format!("ip:{ip}")
        }
    };

    if !state.limiter.allow(&key) {
        metrics::record_rate_limited();
        tracing::debug!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
        return GatewayError::AdmissionRejected.into_response();
    }

    next.run(request).await
}

/// Bearer token check. Public paths pass through untouched.
pub async fn auth_middleware(
    State(state): State<GatewayState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if state.auth.is_public(request.uri().path())
        || request.extensions().get::<UserContext>().is_some()
    {
        return next.run(request).await;
    }

    match state.auth.verify(request.headers()) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(path = %request.uri().path(), error = %e, "Authentication failed");
            GatewayError::Unauthorized(e.to_string()).into_response()
        }
    }
}

/// Load shedding for services that embed admission control at their own
/// boundary:
///
/// ```ignore
/// let shedder = Arc::new(LoadShedder::new(500));
/// let app = Router::new()
///     .route("/tick", post(tick))
///     .layer(axum::middleware::from_fn_with_state(shedder, load_shed_middleware));
/// ```
pub async fn load_shed_middleware(
    State(shedder): State<Arc<LoadShedder>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(_permit) = shedder.try_acquire() else {
        tracing::debug!(
            in_flight = shedder.current(),
            max = shedder.max_concurrent(),
            "Shedding request"
        );
        return GatewayError::Overloaded.into_response();
    };
    next.run(request).await
}

/// Request count and latency per method and status.
pub async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let response = next.run(request).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}
