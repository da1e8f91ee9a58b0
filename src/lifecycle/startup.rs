//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Config is loaded and validated before anything binds
//! - The listener is bound last, once the gateway is fully built

use tokio::net::TcpListener;

use crate::config::{self, ConfigError, GatewayConfig};
use crate::http::Gateway;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Load configuration from the file named by `GATEWAY_CONFIG` and the
/// environment.
pub fn load_config() -> Result<GatewayConfig, StartupError> {
    Ok(config::load()?)
}

/// Build the gateway and bind its listener.
pub async fn prepare(config: GatewayConfig) -> Result<(Gateway, TcpListener), StartupError> {
    let addr = config.listener.bind_address.clone();
    let gateway = Gateway::new(config);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    Ok((gateway, listener))
}
