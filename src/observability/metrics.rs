//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound requests by method, status
//! - `gateway_request_duration_seconds` (histogram): inbound latency
//! - `gateway_rate_limited_total` (counter): requests rejected by the limiter
//! - `gateway_requests_shed_total` (counter): requests rejected by the shedder
//! - `gateway_in_flight_requests` (gauge): requests holding shedder capacity
//! - `gateway_circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `gateway_circuit_breaker_transitions_total` (counter): by breaker, target state
//! - `gateway_upstream_requests_total` (counter): by route, outcome
//! - `gateway_upstream_duration_seconds` (histogram): backend latency by route
//! - `gateway_rate_limiter_clients` (gauge): tracked client buckets
//!
//! The recorder is process-global. [`install`] is idempotent so every
//! gateway instance in a process (tests build many) shares one handle.

use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
pub const RATE_LIMITED_TOTAL: &str = "gateway_rate_limited_total";
pub const REQUESTS_SHED_TOTAL: &str = "gateway_requests_shed_total";
pub const IN_FLIGHT_REQUESTS: &str = "gateway_in_flight_requests";
pub const BREAKER_STATE: &str = "gateway_circuit_breaker_state";
pub const BREAKER_TRANSITIONS_TOTAL: &str = "gateway_circuit_breaker_transitions_total";
pub const UPSTREAM_REQUESTS_TOTAL: &str = "gateway_upstream_requests_total";
pub const UPSTREAM_DURATION_SECONDS: &str = "gateway_upstream_duration_seconds";
pub const LIMITER_CLIENTS: &str = "gateway_rate_limiter_clients";

static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder (once per process) and return its handle.
pub fn install() -> PrometheusHandle {
    PROMETHEUS
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if let Err(e) = metrics::set_global_recorder(recorder) {
                tracing::warn!(error = %e, "Metrics recorder already installed; /metrics will be empty");
            }
            describe();
            handle
        })
        .clone()
}

fn describe() {
    describe_counter!(REQUESTS_TOTAL, Unit::Count, "Inbound requests handled by the gateway.");
    describe_histogram!(REQUEST_DURATION_SECONDS, Unit::Seconds, "Inbound request latency.");
    describe_counter!(RATE_LIMITED_TOTAL, Unit::Count, "Requests rejected by the rate limiter.");
    describe_counter!(REQUESTS_SHED_TOTAL, Unit::Count, "Requests rejected by the load shedder.");
    describe_gauge!(IN_FLIGHT_REQUESTS, "Requests currently holding load-shedder capacity.");
    describe_gauge!(BREAKER_STATE, "Circuit breaker state (0 closed, 1 open, 2 half-open).");
    describe_counter!(BREAKER_TRANSITIONS_TOTAL, Unit::Count, "Circuit breaker state transitions.");
    describe_counter!(UPSTREAM_REQUESTS_TOTAL, Unit::Count, "Requests forwarded to backends by outcome.");
    describe_histogram!(UPSTREAM_DURATION_SECONDS, Unit::Seconds, "Backend response latency.");
    describe_gauge!(LIMITER_CLIENTS, "Client buckets tracked by the rate limiter.");
}

/// Render the current metrics in Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.run_upkeep();
    handle.render()
}

/// Record a completed inbound request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(REQUESTS_TOTAL, "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!(RATE_LIMITED_TOTAL).increment(1);
}

pub fn record_shed() {
    counter!(REQUESTS_SHED_TOTAL).increment(1);
}

pub fn set_in_flight(current: usize) {
    gauge!(IN_FLIGHT_REQUESTS).set(current as f64);
}

/// Publish a breaker's state after a transition.
pub fn record_breaker_transition(breaker: &str, to: &'static str, gauge_value: f64) {
    gauge!(BREAKER_STATE, "breaker" => breaker.to_string()).set(gauge_value);
    counter!(BREAKER_TRANSITIONS_TOTAL, "breaker" => breaker.to_string(), "to" => to).increment(1);
}

pub fn set_breaker_state(breaker: &str, gauge_value: f64) {
    gauge!(BREAKER_STATE, "breaker" => breaker.to_string()).set(gauge_value);
}

/// Record the outcome of one forwarded request.
pub fn record_upstream(route: &str, outcome: &'static str, start: Instant) {
    counter!(UPSTREAM_REQUESTS_TOTAL, "route" => route.to_string(), "outcome" => outcome)
        .increment(1);
    histogram!(UPSTREAM_DURATION_SECONDS, "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn set_limiter_clients(count: usize) {
    gauge!(LIMITER_CLIENTS).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent_and_renders() {
        let first = install();
        let second = install();
        record_rate_limited();
        assert!(render(&first).contains(RATE_LIMITED_TOTAL));
        assert!(render(&second).contains(RATE_LIMITED_TOTAL));
    }
}
