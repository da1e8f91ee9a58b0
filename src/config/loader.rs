//! Configuration loading from disk and the environment.
//!
//! Precedence, lowest first: built-in defaults, the TOML file named by
//! `GATEWAY_CONFIG`, then individual environment variables.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::{BackendConfig, GatewayConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming the optional TOML file.
pub const CONFIG_PATH_VAR: &str = "GATEWAY_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, overlay the process environment, and validate.
pub fn load() -> Result<GatewayConfig, ConfigError> {
    let vars: BTreeMap<String, String> = std::env::vars().collect();
    let base = match vars.get(CONFIG_PATH_VAR) {
        Some(path) => read_file(Path::new(path))?,
        None => GatewayConfig::default(),
    };
    let config = apply_env(base, &vars)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file alone.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let config = read_file(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Overlay environment variables onto `config`.
pub fn apply_env(
    mut config: GatewayConfig,
    vars: &BTreeMap<String, String>,
) -> Result<GatewayConfig, ConfigError> {
    if let Some(v) = vars.get("GATEWAY_ADDR") {
        config.listener.bind_address = v.clone();
    }
    if let Some(v) = vars.get("API_PREFIX") {
        config.listener.api_prefix = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = vars.get("GATEWAY_NAME") {
        config.listener.gateway_name = v.clone();
    }

    set_parsed(vars, "RATE_LIMIT_RPM", &mut config.rate_limit.requests_per_minute)?;
    set_parsed(vars, "BURST_LIMIT", &mut config.rate_limit.burst_limit)?;
    set_parsed(vars, "RATE_LIMIT_IDLE_TTL_SEC", &mut config.rate_limit.idle_ttl_secs)?;
    set_parsed(vars, "RATE_LIMIT_REAP_INTERVAL_SEC", &mut config.rate_limit.reap_interval_secs)?;

    set_parsed(vars, "CB_FAILURE_THRESHOLD", &mut config.circuit_breaker.failure_threshold)?;
    set_parsed(vars, "CB_TIMEOUT_SEC", &mut config.circuit_breaker.timeout_secs)?;
    set_parsed(vars, "CB_MAX_REQUESTS", &mut config.circuit_breaker.max_requests)?;
    set_parsed(vars, "CB_INTERVAL_SEC", &mut config.circuit_breaker.interval_secs)?;

    set_parsed(vars, "MAX_CONCURRENT", &mut config.load_shed.max_concurrent)?;

    set_parsed(vars, "READ_TIMEOUT_SEC", &mut config.timeouts.read_secs)?;
    set_parsed(vars, "WRITE_TIMEOUT_SEC", &mut config.timeouts.write_secs)?;
    set_parsed(vars, "IDLE_TIMEOUT_SEC", &mut config.timeouts.idle_secs)?;
    set_parsed(vars, "UPSTREAM_TIMEOUT_MS", &mut config.timeouts.upstream_ms)?;
    set_parsed(vars, "SHUTDOWN_TIMEOUT_SEC", &mut config.timeouts.shutdown_secs)?;

    if let Some(v) = vars.get("JWT_SECRET") {
        config.auth.jwt_secret = v.clone();
    }
    if let Some(v) = vars.get("PUBLIC_PATHS") {
        config.auth.public_paths = split_list(v);
    }
    if let Some(v) = vars.get("CORS_ALLOWED_ORIGINS") {
        config.security.cors_allowed_origins = split_list(v);
    }
    set_parsed(vars, "TRUST_FORWARDED_HEADERS", &mut config.security.trust_forwarded_headers)?;

    if let Some(v) = vars.get("LOG_LEVEL") {
        config.observability.log_level = v.clone();
    }
    if let Some(v) = vars.get("LOG_FORMAT") {
        config.observability.json_logs = v.eq_ignore_ascii_case("json");
    }

    apply_backend_env(&mut config, vars)?;
    Ok(config)
}

/// `BACKEND_<NAME>_URL` and `BACKEND_<NAME>_TIMEOUT_MS`. `<NAME>` becomes the
/// route segment: lowercased, underscores turned into dashes.
fn apply_backend_env(
    config: &mut GatewayConfig,
    vars: &BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    for (key, value) in vars {
        let Some(rest) = key.strip_prefix("BACKEND_") else {
            continue;
        };
        if let Some(raw) = rest.strip_suffix("_URL") {
            backend_entry(config, raw).url = value.trim().to_string();
        } else if let Some(raw) = rest.strip_suffix("_TIMEOUT_MS") {
            let ms = parse_value::<u64>(key, value)?;
            backend_entry(config, raw).timeout_ms = Some(ms);
        }
    }
    // A timeout without a URL names no usable backend.
    config.backends.retain(|b| {
        let keep = !b.url.is_empty();
        if !keep {
            tracing::warn!(backend = %b.name, "Backend has a timeout but no URL; ignoring");
        }
        keep
    });
    Ok(())
}

fn backend_entry<'a>(config: &'a mut GatewayConfig, raw: &str) -> &'a mut BackendConfig {
    let name = raw.to_ascii_lowercase().replace('_', "-");
    let index = match config.backends.iter().position(|b| b.name == name) {
        Some(i) => i,
        None => {
            config.backends.push(BackendConfig {
                name,
                url: String::new(),
                timeout_ms: None,
            });
            config.backends.len() - 1
        }
    };
    &mut config.backends[index]
}

fn set_parsed<T: FromStr>(
    vars: &BTreeMap<String, String>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = vars.get(key) {
        *target = parse_value(key, raw)?;
    }
    Ok(())
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
