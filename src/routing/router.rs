//! Route lookup.
//!
//! # Responsibilities
//! - Compile backend configuration into immutable routes at startup
//! - Look up the route for a request path
//! - Build the upstream URI for a matched route
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) service lookup via HashMap
//! - A backend with an unusable URL stays known as Unavailable so its
//!   requests fail fast with 503 instead of looking like a 404

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use axum::http::Uri;
use url::Url;

use crate::config::GatewayConfig;
use crate::resilience::{BreakerRegistry, CircuitBreaker};
use crate::routing::matcher::PrefixMatcher;

/// A backend reachable through the gateway.
#[derive(Debug)]
pub struct ServiceRoute {
    pub name: String,
    /// `scheme://host[:port]` of the backend.
    origin: String,
    /// Path of the configured base URL without a trailing slash.
    base_path: String,
    pub timeout: Duration,
    pub breaker: Arc<CircuitBreaker>,
}

impl ServiceRoute {
    /// Upstream URI for a request whose path after the service segment is
    /// `rest` and whose query string is `query`.
    pub fn upstream_uri(&self, rest: &str, query: Option<&str>) -> Result<Uri, axum::http::Error> {
        let mut path = format!("{}{}", self.base_path, rest);
        if path.is_empty() {
            path.push('/');
        }
        let uri = match query {
            Some(q) => format!("{}{}?{}", self.origin, path, q),
            None => format!("{}{}", self.origin, path),
        };
        Ok(uri.parse::<Uri>()?)
    }

    pub fn base_url(&self) -> String {
        format!("{}{}", self.origin, self.base_path)
    }
}

/// Result of a route lookup.
#[derive(Debug)]
pub enum RouteMatch<'a> {
    Found {
        route: &'a ServiceRoute,
        rest: &'a str,
    },
    /// Configured, but the backend URL was rejected at startup.
    Unavailable(&'a str),
    NoMatch,
}

/// Immutable map from service name to backend.
#[derive(Debug)]
pub struct RouteTable {
    matcher: PrefixMatcher,
    routes: HashMap<String, ServiceRoute>,
    unavailable: HashSet<String>,
}

impl RouteTable {
    /// Compile routes, registering one breaker per usable backend.
    pub fn from_config(config: &GatewayConfig, breakers: &mut BreakerRegistry) -> Self {
        let settings = config.breaker_settings();
        let mut routes = HashMap::new();
        let mut unavailable = HashSet::new();

        for backend in &config.backends {
            match parse_base_url(&backend.url) {
                Ok(url) => {
                    let route = ServiceRoute {
                        name: backend.name.clone(),
                        origin: url.origin().ascii_serialization(),
                        base_path: url.path().trim_end_matches('/').to_string(),
                        timeout: config.upstream_timeout(backend),
                        breaker: breakers.register(&backend.name, &settings),
                    };
                    tracing::info!(
                        route = %route.name,
                        backend = %route.base_url(),
                        timeout_ms = route.timeout.as_millis() as u64,
                        "Route registered"
                    );
                    routes.insert(backend.name.clone(), route);
                }
                Err(reason) => {
                    tracing::error!(
                        route = %backend.name,
                        url = %backend.url,
                        reason = %reason,
                        "Invalid backend URL; route disabled"
                    );
                    unavailable.insert(backend.name.clone());
                }
            }
        }

        Self {
            matcher: PrefixMatcher::new(config.listener.api_prefix.clone()),
            routes,
            unavailable,
        }
    }

    pub fn resolve<'a>(&'a self, path: &'a str) -> RouteMatch<'a> {
        let Some(split) = self.matcher.split(path) else {
            return RouteMatch::NoMatch;
        };
        if let Some(route) = self.routes.get(split.service) {
            return RouteMatch::Found {
                route,
                rest: split.rest,
            };
        }
        match self.unavailable.get(split.service) {
            Some(name) => RouteMatch::Unavailable(name.as_str()),
            None => RouteMatch::NoMatch,
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn parse_base_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err("base URL must not carry a query or fragment".to_string());
    }
    Ok(url)
}
