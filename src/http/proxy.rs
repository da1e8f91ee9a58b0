//! Reverse proxy forwarding.
//!
//! # Flow
//! ```text
//! path → RouteTable::resolve
//!      → breaker.can_execute()        (503 CircuitOpen)
//!      → shedder.try_acquire()        (503 Overloaded)
//!      → rewrite URI + headers
//!      → client.request() under min(route timeout, request timeout)
//!      → breaker.record_result(2xx)
//! ```
//!
//! Every outcome is terminal: a failed or timed-out call is reported to the
//! client, never retried. Failures that originate in the client's own request
//! body (too large, too slow) are not charged to the breaker.

use std::error::Error as StdError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use tower_http::timeout::TimeoutError;

use crate::error::GatewayError;
use crate::http::middleware::ClientIp;
use crate::http::server::GatewayState;
use crate::observability::metrics;
use crate::routing::RouteMatch;
use crate::security::headers::{apply_forwarding_headers, strip_hop_by_hop, ForwardingInfo};
use crate::security::UserContext;

/// Catch-all handler for everything under the API prefix.
pub async fn proxy_handler(State(state): State<GatewayState>, request: Request<Body>) -> Response {
    match forward(&state, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn forward(state: &GatewayState, request: Request<Body>) -> Result<Response, GatewayError> {
    let path = request.uri().path().to_owned();
    let query = request.uri().query().map(str::to_owned);

    let (route, rest) = match state.routes.resolve(&path) {
        RouteMatch::Found { route, rest } => (route, rest),
        RouteMatch::Unavailable(name) => {
            tracing::warn!(route = %name, "Request for route with unusable backend URL");
            return Err(GatewayError::RouteUnavailable {
                route: name.to_string(),
            });
        }
        RouteMatch::NoMatch => return Err(GatewayError::NotFound { path: path.clone() }),
    };

    let uri = route.upstream_uri(rest, query.as_deref()).map_err(|e| {
        tracing::warn!(route = %route.name, path = %path, error = %e, "Cannot build upstream URI");
        GatewayError::BadGateway(format!("cannot build upstream URI: {e}"))
    })?;

    if !route.breaker.can_execute() {
        tracing::debug!(route = %route.name, "Circuit open; rejecting");
        return Err(GatewayError::CircuitOpen {
            route: route.name.clone(),
        });
    }

    let Some(_permit) = state.shedder.try_acquire() else {
        tracing::debug!(route = %route.name, in_flight = state.shedder.current(), "Shedding request");
        return Err(GatewayError::Overloaded);
    };

    let (mut parts, body) = request.into_parts();
    let client_ip = parts
        .extensions
        .get::<ClientIp>()
        .map(|ClientIp(ip)| *ip)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let peer_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(client_ip);
    let user_id = parts.extensions.get::<UserContext>().map(|u| u.user_id.as_str());

    strip_hop_by_hop(&mut parts.headers);
    apply_forwarding_headers(
        &mut parts.headers,
        &ForwardingInfo {
            client_ip,
            peer_ip,
            gateway_name: &state.gateway_name,
            user_id,
            trust_forwarded: state.trust_forwarded,
        },
    );

    let mut upstream = Request::new(body);
    *upstream.method_mut() = parts.method.clone();
    *upstream.uri_mut() = uri;
    *upstream.headers_mut() = parts.headers;

    tracing::debug!(
        route = %route.name,
        method = %parts.method,
        upstream = %upstream.uri(),
        "Forwarding request"
    );

    let deadline = route.timeout.min(state.request_timeout);
    let start = Instant::now();
    match tokio::time::timeout(deadline, state.client.request(upstream)).await {
        Ok(Ok(response)) => {
            let status = response.status();
            let success = status.is_success();
            route.breaker.record_result(success);
            metrics::record_upstream(&route.name, if success { "success" } else { "failure" }, start);
            if !success {
                tracing::debug!(route = %route.name, status = %status, "Backend returned non-2xx");
            }

            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Ok(Response::from_parts(parts, Body::new(body)))
        }
        Ok(Err(e)) => {
            if let Some(rejection) = client_body_error(&e, state.max_body_size) {
                metrics::record_upstream(&route.name, "client_abort", start);
                tracing::debug!(route = %route.name, error = %e, "Request body rejected mid-stream");
                return Err(rejection);
            }
            route.breaker.record_result(false);
            metrics::record_upstream(&route.name, "error", start);
            tracing::warn!(route = %route.name, error = %e, "Upstream request failed");
            Err(GatewayError::BadGateway(format!("backend '{}' unreachable", route.name)))
        }
        Err(_) => {
            route.breaker.record_result(false);
            metrics::record_upstream(&route.name, "timeout", start);
            let after_ms = deadline.as_millis() as u64;
            tracing::warn!(route = %route.name, after_ms, "Upstream request timed out");
            Err(GatewayError::Timeout { after_ms })
        }
    }
}

/// Map an upstream error caused by the inbound body to the client's fault.
fn client_body_error(err: &(dyn StdError + 'static), limit: usize) -> Option<GatewayError> {
    let mut source = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return Some(GatewayError::PayloadTooLarge { limit });
        }
        if e.is::<TimeoutError>() {
            return Some(GatewayError::RequestTimeout);
        }
        source = e.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use http_body_util::{BodyExt, Full, Limited};

    #[tokio::test]
    async fn length_limit_is_a_client_error() {
        let err = Limited::new(Full::new(Bytes::from_static(b"far too long")), 4)
            .collect()
            .await
            .unwrap_err();
        let wrapped = axum::Error::new(err);

        let mapped = client_body_error(&wrapped, 4).unwrap();
        assert!(matches!(mapped, GatewayError::PayloadTooLarge { limit: 4 }));
    }

    #[test]
    fn transport_errors_stay_upstream_failures() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(client_body_error(&refused, 16).is_none());
    }
}
