//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request path
//!     → matcher.rs (strip versioned prefix, split service segment)
//!     → router.rs (service lookup)
//!     → Return: Found route + remaining path, Unavailable, or NoMatch
//!
//! Route Compilation (at startup):
//!     BackendConfig[]
//!     → Parse base URLs (bad URL → Unavailable)
//!     → Register one circuit breaker per route
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use router::{RouteMatch, RouteTable, ServiceRoute};
