//! Edge API gateway for a game platform.
//!
//! Terminates client HTTP traffic, applies admission control (rate limit,
//! auth, per-route circuit breakers, load shedding) and reverse-proxies the
//! survivors to independent backend services.
//!
//! The [`resilience`] module has no HTTP dependency and can be embedded by
//! any service that needs local admission control.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::{Gateway, GatewayState};
pub use lifecycle::{Shutdown, ShutdownOutcome};
