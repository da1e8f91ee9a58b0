//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits so a TOML file can provide a base layer that
//! environment variables then override.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{BreakerSettings, RateLimitSettings};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, path prefix).
    pub listener: ListenerConfig,

    /// Backend services, one route per entry.
    pub backends: Vec<BackendConfig>,

    /// Per-client token bucket settings.
    pub rate_limit: RateLimitConfig,

    /// Per-route circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Process-wide concurrency ceiling.
    pub load_shed: LoadShedConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Credential verification.
    pub auth: AuthConfig,

    /// CORS, forwarded headers, response hardening.
    pub security: SecurityConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Versioned prefix stripped before forwarding (e.g., "/api/v1").
    pub api_prefix: String,

    /// Value sent to backends in `X-Gateway`.
    pub gateway_name: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            api_prefix: "/api/v1".to_string(),
            gateway_name: "game-gateway".to_string(),
        }
    }
}

/// Backend service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Logical service name; requests to `<api_prefix>/<name>/...` go here.
    pub name: String,

    /// Base URL (e.g., "http://combat:8080").
    pub url: String,

    /// Upstream deadline override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained refill rate per client.
    pub requests_per_minute: u32,

    /// Bucket capacity.
    pub burst_limit: u32,

    /// Idle buckets older than this are evicted.
    pub idle_ttl_secs: u64,

    /// How often the eviction task runs.
    pub reap_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_limit: 10,
            idle_ttl_secs: 600,
            reap_interval_secs: 60,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,

    /// Seconds spent Open before a probe.
    pub timeout_secs: u64,

    /// Successful probes needed to close again.
    pub max_requests: u32,

    /// Closed-state counting window in seconds (0 = unbounded).
    pub interval_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_secs: 30,
            max_requests: 1,
            interval_secs: 0,
        }
    }
}

/// Load shedding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadShedConfig {
    pub max_concurrent: usize,
}

impl Default for LoadShedConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for receiving the request body, in seconds.
    pub read_secs: u64,

    /// Deadline for the whole request/response, in seconds.
    pub write_secs: u64,

    /// Idle upstream connection lifetime, in seconds.
    pub idle_secs: u64,

    /// Default backend deadline in milliseconds.
    pub upstream_ms: u64,

    /// Drain deadline on shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 10,
            write_secs: 30,
            idle_secs: 60,
            upstream_ms: 5000,
            shutdown_secs: 30,
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret for bearer tokens.
    pub jwt_secret: String,

    /// Path prefixes served without a credential.
    pub public_paths: Vec<String>,
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Origins allowed by CORS; `*` allows any.
    pub cors_allowed_origins: Vec<String>,

    /// Honour `X-Forwarded-For` / `X-Real-IP` from the peer.
    pub trust_forwarded_headers: bool,

    /// Add security response headers.
    pub enable_headers: bool,

    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_allowed_origins: vec!["*".to_string()],
            trust_forwarded_headers: false,
            enable_headers: true,
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl GatewayConfig {
    pub fn breaker_settings(&self) -> BreakerSettings {
        BreakerSettings {
            max_failures: self.circuit_breaker.failure_threshold,
            probe_limit: self.circuit_breaker.max_requests,
            open_timeout: Duration::from_secs(self.circuit_breaker.timeout_secs),
            interval: Duration::from_secs(self.circuit_breaker.interval_secs),
        }
    }

    pub fn rate_limit_settings(&self) -> RateLimitSettings {
        RateLimitSettings {
            requests_per_minute: self.rate_limit.requests_per_minute,
            burst_limit: self.rate_limit.burst_limit,
            idle_ttl: Duration::from_secs(self.rate_limit.idle_ttl_secs),
        }
    }

    /// Deadline for calls to `backend`.
    pub fn upstream_timeout(&self, backend: &BackendConfig) -> Duration {
        Duration::from_millis(backend.timeout_ms.unwrap_or(self.timeouts.upstream_ms))
    }
}
