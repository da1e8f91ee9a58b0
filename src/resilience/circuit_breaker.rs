//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= max_failures (consecutive, within interval)
//! Open → Half-Open: first can_execute() after open_timeout since last failure
//! Half-Open → Closed: success_count >= probe_limit
//! Half-Open → Open: any probe failure
//! ```
//!
//! # Design Decisions
//! - Per-route circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - All state lives behind one mutex so check-and-transition is atomic
//! - Results arriving while Open are ignored; they belong to calls admitted
//!   before the breaker tripped

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 2.0,
        }
    }
}

/// Thresholds shared by every breaker built from the same configuration.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Consecutive failures in Closed that trip the breaker.
    pub max_failures: u32,
    /// Successes in Half-Open that close the breaker.
    pub probe_limit: u32,
    /// Time spent Open before a probe is let through.
    pub open_timeout: Duration,
    /// Closed-state counting window; zero means counts never expire by time.
    pub interval: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: 5,
            probe_limit: 1,
            open_timeout: Duration::from_secs(30),
            interval: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    window_start: Instant,
}

/// Per-backend failure-tracking state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        let name = name.into();
        metrics::set_breaker_state(&name, BreakerState::Closed.gauge_value());
        Self {
            name,
            settings,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
                window_start: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.lock().success_count
    }

    /// Whether a call to the backend may be attempted now.
    pub fn can_execute(&self) -> bool {
        self.can_execute_at(Instant::now())
    }

    /// Feed back the outcome of one completed attempt. Timeouts are failures.
    pub fn record_result(&self, success: bool) {
        self.record_result_at(success, Instant::now())
    }

    /// True while calls would be rejected. An Open breaker whose timeout has
    /// elapsed admits the next call as a probe, so it no longer counts as open.
    pub fn is_open(&self) -> bool {
        self.is_open_at(Instant::now())
    }

    pub(crate) fn is_open_at(&self, now: Instant) -> bool {
        let inner = self.lock();
        inner.state == BreakerState::Open && !self.cooled_down(&inner, now)
    }

    fn cooled_down(&self, inner: &Inner, now: Instant) -> bool {
        inner
            .last_failure_time
            .map(|at| now.saturating_duration_since(at) > self.settings.open_timeout)
            .unwrap_or(true)
    }

    pub(crate) fn can_execute_at(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let cooled_down = self.cooled_down(&inner, now);
                if cooled_down {
                    inner.success_count = 0;
                    self.transition(&mut inner, BreakerState::HalfOpen, now);
                }
                cooled_down
            }
        }
    }

    pub(crate) fn record_result_at(&self, success: bool, now: Instant) {
        let mut inner = self.lock();
        match (inner.state, success) {
            (BreakerState::Closed, true) => {
                inner.failure_count = 0;
            }
            (BreakerState::Closed, false) => {
                if !self.settings.interval.is_zero()
                    && now.saturating_duration_since(inner.window_start) > self.settings.interval
                {
                    inner.failure_count = 0;
                    inner.window_start = now;
                }
                inner.failure_count += 1;
                if inner.failure_count >= self.settings.max_failures {
                    inner.last_failure_time = Some(now);
                    self.transition(&mut inner, BreakerState::Open, now);
                }
            }
            (BreakerState::HalfOpen, true) => {
                inner.success_count += 1;
                if inner.success_count >= self.settings.probe_limit {
                    inner.failure_count = 0;
                    self.transition(&mut inner, BreakerState::Closed, now);
                }
            }
            (BreakerState::HalfOpen, false) => {
                inner.last_failure_time = Some(now);
                self.transition(&mut inner, BreakerState::Open, now);
            }
            (BreakerState::Open, _) => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        if to == BreakerState::Closed {
            inner.success_count = 0;
            inner.window_start = now;
        }

        if to == BreakerState::Open {
            tracing::warn!(
                breaker = %self.name,
                from = from.as_str(),
                failures = inner.failure_count,
                "Circuit breaker opened"
            );
        } else {
            tracing::info!(
                breaker = %self.name,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit breaker state changed"
            );
        }
        metrics::record_breaker_transition(&self.name, to.as_str(), to.gauge_value());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }
}

/// Point-in-time view of one breaker for health reporting.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: &'static str,
    pub failure_count: u32,
}

/// All breakers owned by a gateway instance, keyed by route name.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: BTreeMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the breaker for `name`, creating it on first use.
    pub fn register(&mut self, name: &str, settings: &BreakerSettings) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, settings.clone())))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).cloned()
    }

    /// True while no breaker is rejecting calls.
    pub fn all_closed_or_probing(&self) -> bool {
        self.breakers.values().all(|b| !b.is_open())
    }

    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        self.breakers
            .values()
            .map(|b| BreakerSnapshot {
                name: b.name().to_string(),
                state: b.state().as_str(),
                failure_count: b.failure_count(),
            })
            .collect()
    }
}
