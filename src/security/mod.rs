//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (verify bearer token unless the path is public)
//!     → headers.rs (sanitize, add X-Forwarded-*, identify gateway and user)
//!     → Pass to the proxy
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any credential problem
//! - No trust in client-supplied identity or forwarding headers

pub mod auth;
pub mod headers;

pub use auth::{AuthError, Authenticator, UserContext};
