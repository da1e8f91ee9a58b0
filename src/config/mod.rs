//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! GATEWAY_CONFIG (optional TOML file)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (overlay environment variables)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → consumed once at startup to build GatewayState
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; routes never change at runtime
//! - All fields have defaults to allow minimal configs
//! - Any invalid value is fatal at startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, ConfigError};
pub use schema::{
    AuthConfig, BackendConfig, CircuitBreakerConfig, GatewayConfig, ListenerConfig,
    LoadShedConfig, ObservabilityConfig, RateLimitConfig, SecurityConfig, TimeoutConfig,
};
