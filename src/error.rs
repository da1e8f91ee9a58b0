//! Gateway error taxonomy.
//!
//! Every rejection the gateway produces, whatever stage of the pipeline it
//! comes from, is one of these variants and serializes to the same JSON shape:
//!
//! ```text
//! {"kind": "CircuitOpen", "message": "circuit open for route 'combat'", "code": 503}
//! ```
//!
//! All of them are terminal: the gateway never retries a client request.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Errors surfaced to clients at the gateway boundary.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Client exhausted its token bucket.
    #[error("rate limit exceeded")]
    AdmissionRejected,

    /// Missing or invalid credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The route's circuit breaker is open.
    #[error("circuit open for route '{route}'")]
    CircuitOpen { route: String },

    /// The load shedder is at capacity.
    #[error("service overloaded")]
    Overloaded,

    /// Backend unreachable or returned a transport error.
    #[error("bad gateway: {0}")]
    BadGateway(String),

    /// Route exists in configuration but its backend URL is unusable.
    #[error("route '{route}' is unavailable")]
    RouteUnavailable { route: String },

    /// Deadline elapsed before the backend responded.
    #[error("upstream timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The client's request body went over the configured size limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// The client stopped sending its request body before the read deadline.
    #[error("request body not received within the read timeout")]
    RequestTimeout,

    /// No route matches the request path.
    #[error("no route for path '{path}'")]
    NotFound { path: String },

    /// Recovered panic or other unexpected failure.
    #[error("internal error")]
    Internal,
}

/// Wire representation of a [`GatewayError`].
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    pub code: u16,
}

impl GatewayError {
    /// Stable machine-readable tag.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::AdmissionRejected => "AdmissionRejected",
            GatewayError::Unauthorized(_) => "Unauthorized",
            GatewayError::CircuitOpen { .. } => "CircuitOpen",
            GatewayError::Overloaded => "Overloaded",
            GatewayError::BadGateway(_) | GatewayError::RouteUnavailable { .. } => "BadGateway",
            GatewayError::Timeout { .. } => "Timeout",
            GatewayError::PayloadTooLarge { .. } => "PayloadTooLarge",
            GatewayError::RequestTimeout => "RequestTimeout",
            GatewayError::NotFound { .. } => "NotFound",
            GatewayError::Internal => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::AdmissionRejected => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            GatewayError::RouteUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
            code: self.status().as_u16(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self.body())).into_response();
        if matches!(self, GatewayError::AdmissionRejected) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(GatewayError::AdmissionRejected.status(), 429);
        assert_eq!(GatewayError::Unauthorized("x".into()).status(), 401);
        assert_eq!(GatewayError::CircuitOpen { route: "a".into() }.status(), 503);
        assert_eq!(GatewayError::Overloaded.status(), 503);
        assert_eq!(GatewayError::BadGateway("refused".into()).status(), 502);
        assert_eq!(GatewayError::RouteUnavailable { route: "a".into() }.status(), 503);
        assert_eq!(GatewayError::Timeout { after_ms: 10 }.status(), 504);
        assert_eq!(GatewayError::PayloadTooLarge { limit: 16 }.status(), 413);
        assert_eq!(GatewayError::RequestTimeout.status(), 408);
        assert_eq!(GatewayError::Internal.status(), 500);
    }

    #[test]
    fn body_is_tagged() {
        let body = GatewayError::CircuitOpen { route: "loot".into() }.body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["kind"], "CircuitOpen");
        assert_eq!(json["code"], 503);
        assert_eq!(json["message"], "circuit open for route 'loot'");
    }

    #[test]
    fn rate_limited_response_has_retry_after() {
        let response = GatewayError::AdmissionRejected.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }
}
