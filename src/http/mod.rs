//! HTTP surface of the gateway.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (layer stack, graceful shutdown)
//!     → middleware.rs (client ip, rate limit, auth)
//!     → health.rs (/health, /ready, /metrics) or proxy.rs (forward)
//!     → Send to client
//! ```

pub mod health;
pub mod middleware;
pub mod proxy;
pub mod server;

pub use middleware::{load_shed_middleware, ClientIp};
pub use server::{Gateway, GatewayState, X_REQUEST_ID};
