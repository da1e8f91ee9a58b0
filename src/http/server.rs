//! Gateway composition.
//!
//! # Responsibilities
//! - Build the shared [`GatewayState`] (routes, breakers, limiter, shedder)
//! - Assemble the middleware stack in admission order
//! - Serve with graceful shutdown and a bounded drain deadline
//!
//! # Layer order (outermost first)
//! ```text
//! request id → trace → panic recovery → client ip → metrics → CORS
//!   → body limit → body read timeout
//!   ├─ /health /ready /metrics
//!   └─ rate limit → auth → proxy (breaker → shedder → forward)
//! ```
//!
//! The whole-request deadline is enforced inside the proxy, where expiry
//! becomes a 504 charged to the route's breaker:
//!
//! ```text
//! deadline = min(route timeout, WRITE_TIMEOUT_SEC)
//! ```

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any as AnyValue, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::RequestBodyTimeoutLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::{health, middleware, proxy};
use crate::lifecycle::{Shutdown, ShutdownOutcome};
use crate::observability::metrics;
use crate::resilience::{BreakerRegistry, LoadShedder, RateLimiter};
use crate::routing::RouteTable;
use crate::security::{headers::security_headers, Authenticator};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Shared state injected into handlers and middleware.
#[derive(Clone)]
pub struct GatewayState {
    pub routes: Arc<RouteTable>,
    pub breakers: Arc<BreakerRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub shedder: Arc<LoadShedder>,
    pub auth: Arc<Authenticator>,
    pub client: Client<HttpConnector, Body>,
    pub metrics: PrometheusHandle,
    pub gateway_name: Arc<str>,
    pub trust_forwarded: bool,
    pub max_body_size: usize,
    /// Upper bound on one proxied call; route deadlines are clamped to it.
    pub request_timeout: Duration,
}

impl GatewayState {
    pub fn new(config: &GatewayConfig) -> Self {
        // Recorder first so breaker registration publishes initial gauges.
        let metrics = metrics::install();
        let mut breakers = BreakerRegistry::new();
        let routes = RouteTable::from_config(config, &mut breakers);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.timeouts.idle_secs))
            .build(HttpConnector::new());

        Self {
            routes: Arc::new(routes),
            breakers: Arc::new(breakers),
            limiter: Arc::new(RateLimiter::new(config.rate_limit_settings())),
            shedder: Arc::new(LoadShedder::new(config.load_shed.max_concurrent)),
            auth: Arc::new(Authenticator::new(&config.auth)),
            client,
            metrics,
            gateway_name: Arc::from(config.listener.gateway_name.as_str()),
            trust_forwarded: config.security.trust_forwarded_headers,
            max_body_size: config.security.max_body_size,
            request_timeout: Duration::from_secs(config.timeouts.write_secs),
        }
    }
}

/// The API gateway: one instance per listening socket.
pub struct Gateway {
    state: GatewayState,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        let state = GatewayState::new(&config);
        tracing::info!(
            gateway = %config.listener.gateway_name,
            prefix = %config.listener.api_prefix,
            routes = state.routes.len(),
            max_concurrent = config.load_shed.max_concurrent,
            "Gateway initialized"
        );
        Self { state, config }
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the full router with every middleware layer.
    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let ops = Router::new()
            .route("/health", get(health::health))
            .route("/ready", get(health::ready))
            .route("/metrics", get(health::prometheus));

        let api = Router::new()
            .fallback(proxy::proxy_handler)
            .layer(from_fn_with_state(state.clone(), middleware::auth_middleware))
            .layer(from_fn_with_state(state.clone(), middleware::rate_limit_middleware));

        let mut app = ops
            .merge(api)
            .with_state(state.clone())
            .layer(RequestBodyTimeoutLayer::new(Duration::from_secs(
                self.config.timeouts.read_secs,
            )))
            .layer(RequestBodyLimitLayer::new(state.max_body_size))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(
                        TraceLayer::new_for_http()
                            .make_span_with(request_span)
                            .on_response(DefaultOnResponse::new().level(Level::INFO)),
                    )
                    .layer(CatchPanicLayer::custom(handle_panic))
                    .layer(from_fn_with_state(state, middleware::client_ip_middleware))
                    .layer(from_fn(middleware::track_metrics))
                    .layer(cors_layer(&self.config.security.cors_allowed_origins)),
            );

        if self.config.security.enable_headers {
            for (name, value) in security_headers() {
                app = app.layer(SetResponseHeaderLayer::if_not_present(name, value));
            }
        }

        app
    }

    /// Serve until `shutdown` fires, then drain for at most the configured
    /// shutdown timeout.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: &Shutdown,
    ) -> Result<ShutdownOutcome, std::io::Error> {
        let addr = listener.local_addr()?;
        let drain_timeout = Duration::from_secs(self.config.timeouts.shutdown_secs);
        let reap_every = Duration::from_secs(self.config.rate_limit.reap_interval_secs);

        let reaper = tokio::spawn(
            Arc::clone(&self.state.limiter).run_reaper(reap_every, shutdown.subscribe()),
        );

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();
        let mut drain = shutdown.subscribe();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await
        });

        tracing::info!(address = %addr, "Gateway listening");

        let outcome = tokio::select! {
            result = &mut server => {
                result.map_err(std::io::Error::other)??;
                ShutdownOutcome::Graceful
            }
            _ = drain.recv() => {
                tracing::info!(
                    in_flight = self.state.shedder.current(),
                    timeout_secs = drain_timeout.as_secs(),
                    "Draining in-flight requests"
                );
                match tokio::time::timeout(drain_timeout, &mut server).await {
                    Ok(result) => {
                        result.map_err(std::io::Error::other)??;
                        ShutdownOutcome::Graceful
                    }
                    Err(_) => {
                        server.abort();
                        tracing::warn!(
                            in_flight = self.state.shedder.current(),
                            "Drain deadline exceeded; dropping remaining connections"
                        );
                        ShutdownOutcome::TimedOut
                    }
                }
            }
        };

        reaper.abort();
        tracing::info!(outcome = ?outcome, "Gateway stopped");
        Ok(outcome)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    tracing::error!(panic = %detail, "Handler panicked; returning 500");
    GatewayError::Internal.into_response()
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AnyValue)
        .allow_headers(AnyValue)
        .max_age(Duration::from_secs(600))
}
