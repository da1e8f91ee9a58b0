//! Resilience subsystem: the shared admission-control library.
//!
//! # Data Flow
//! ```text
//! Request admitted by the gateway:
//!     → rate_limiter.rs (per-client token bucket)
//!     → circuit_breaker.rs (per-route: may we call this backend at all?)
//!     → load_shedder.rs (process-wide concurrency ceiling)
//!     → backend call; outcome fed back into circuit_breaker.rs
//!
//! Secondary operations inside services:
//!     → retries.rs (transient-only retries)
//!     → backoff.rs (exponential delay with jitter)
//! ```
//!
//! # Design Decisions
//! - No HTTP framework types here; hot-path services embed these directly
//! - Every component is an owned value, never a global, so tests get fresh state
//! - Mutex for the breaker, sharded map for the limiter, atomics for the shedder

pub mod backoff;
pub mod circuit_breaker;
pub mod load_shedder;
pub mod rate_limiter;
pub mod retries;

pub use circuit_breaker::{BreakerRegistry, BreakerSettings, BreakerState, CircuitBreaker};
pub use load_shedder::{LoadShedder, ShedGuard};
pub use rate_limiter::{RateLimitSettings, RateLimiter};
pub use retries::{retry_with_backoff, ErrorClass, RetryPolicy};
