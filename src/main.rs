//! Game platform API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────┐
//!                       │                   API GATEWAY                     │
//!                       │                                                   │
//!   Client Request      │  ┌──────────┐   ┌──────────┐   ┌──────────────┐  │
//!   ────────────────────┼─▶│ request  │──▶│  rate    │──▶│    auth      │  │
//!                       │  │ id / log │   │  limit   │   │  (bearer)    │  │
//!                       │  └──────────┘   └──────────┘   └──────┬───────┘  │
//!                       │                                        ▼          │
//!                       │                 ┌──────────┐   ┌──────────────┐  │
//!                       │                 │ load     │◀──│ route table  │  │
//!                       │                 │ shedder  │   │ + breaker    │  │
//!                       │                 └────┬─────┘   └──────────────┘  │
//!                       │                      ▼                            │
//!   Client Response     │               ┌──────────────┐                   │
//!   ◀───────────────────┼───────────────│ reverse proxy│◀──────────────────┼── Backend
//!                       │               └──────────────┘                   │   Service
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! Exit codes: 0 after a graceful drain, 1 on startup failure, 2 when the
//! drain deadline expired with requests still in flight.

use std::process::ExitCode;

use game_gateway::lifecycle::{signals, startup, Shutdown, ShutdownOutcome};
use game_gateway::observability::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match startup::load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init(&Default::default());
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::from(1);
        }
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "game-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        rate_limit_rpm = config.rate_limit.requests_per_minute,
        burst_limit = config.rate_limit.burst_limit,
        max_concurrent = config.load_shed.max_concurrent,
        "Configuration loaded"
    );

    let (gateway, listener) = match startup::prepare(config).await {
        Ok(ready) => ready,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::from(1);
        }
    };

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    match gateway.run(listener, &shutdown).await {
        Ok(ShutdownOutcome::Graceful) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Ok(ShutdownOutcome::TimedOut) => {
            tracing::error!("Shutdown deadline exceeded");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!(error = %e, "Server error");
            ExitCode::from(1)
        }
    }
}
