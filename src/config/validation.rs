//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde and the env parser handle syntax)
//! - Validate value ranges (limits and timeouts > 0, address parseable)
//! - Detect duplicate backend names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Backend URLs are not checked here; a bad URL disables only its route

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if !config.listener.api_prefix.starts_with('/') {
        errors.push(ValidationError::new("listener.api_prefix", "must start with '/'"));
    }

    if config.auth.jwt_secret.trim().is_empty() {
        errors.push(ValidationError::new("auth.jwt_secret", "JWT_SECRET is required"));
    }

    let positive = [
        ("rate_limit.requests_per_minute", u64::from(config.rate_limit.requests_per_minute)),
        ("rate_limit.burst_limit", u64::from(config.rate_limit.burst_limit)),
        ("rate_limit.reap_interval_secs", config.rate_limit.reap_interval_secs),
        ("circuit_breaker.failure_threshold", u64::from(config.circuit_breaker.failure_threshold)),
        ("circuit_breaker.max_requests", u64::from(config.circuit_breaker.max_requests)),
        ("load_shed.max_concurrent", config.load_shed.max_concurrent as u64),
        ("timeouts.read_secs", config.timeouts.read_secs),
        ("timeouts.write_secs", config.timeouts.write_secs),
        ("timeouts.upstream_ms", config.timeouts.upstream_ms),
        ("timeouts.shutdown_secs", config.timeouts.shutdown_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    let mut seen = HashSet::new();
    for backend in &config.backends {
        if backend.name.is_empty() || backend.name.contains('/') {
            errors.push(ValidationError::new(
                "backends.name",
                format!("'{}' is not a valid route segment", backend.name),
            ));
        }
        if !seen.insert(backend.name.as_str()) {
            errors.push(ValidationError::new(
                "backends.name",
                format!("duplicate backend '{}'", backend.name),
            ));
        }
        if backend.timeout_ms == Some(0) {
            errors.push(ValidationError::new(
                "backends.timeout_ms",
                format!("backend '{}' has a zero timeout", backend.name),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BackendConfig;

    fn valid() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.jwt_secret = "secret".into();
        config
    }

    #[test]
    fn default_with_secret_is_valid() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.rate_limit.burst_limit = 0;
        config.load_shed.max_concurrent = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"auth.jwt_secret"));
        assert!(fields.contains(&"rate_limit.burst_limit"));
        assert!(fields.contains(&"load_shed.max_concurrent"));
    }

    #[test]
    fn rejects_duplicate_backends() {
        let mut config = valid();
        for _ in 0..2 {
            config.backends.push(BackendConfig {
                name: "combat".into(),
                url: "http://combat:8080".into(),
                timeout_ms: None,
            });
        }
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("duplicate"));
    }

    #[test]
    fn bad_backend_url_is_not_fatal() {
        let mut config = valid();
        config.backends.push(BackendConfig {
            name: "loot".into(),
            url: "not a url".into(),
            timeout_ms: None,
        });
        assert!(validate_config(&config).is_ok());
    }
}
