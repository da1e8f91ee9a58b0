//! Bounded-concurrency load shedding.
//!
//! One shedder per process. `allow()` reserves a slot with a CAS loop so the
//! in-flight count can never pass `max_concurrent`, even transiently.
//! Prefer [`LoadShedder::try_acquire`], whose guard releases the slot on drop
//! (including unwinding), over manual `allow()`/`done()` pairing.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

#[derive(Debug)]
pub struct LoadShedder {
    in_flight: AtomicUsize,
    shed: AtomicU64,
    max_concurrent: usize,
}

impl LoadShedder {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            shed: AtomicU64::new(0),
            max_concurrent,
        }
    }

    /// Reserve a slot. On `true` the caller owes exactly one [`done`](Self::done).
    pub fn allow(&self) -> bool {
        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.max_concurrent {
                self.shed.fetch_add(1, Ordering::Relaxed);
                metrics::record_shed();
                return false;
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    metrics::set_in_flight(current + 1);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Release a slot taken by a successful [`allow`](Self::allow).
    pub fn done(&self) {
        let previous = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(n) => metrics::set_in_flight(n - 1),
            Err(_) => tracing::error!("LoadShedder::done called without a matching allow"),
        }
    }

    /// Reserve a slot tied to the lifetime of the returned guard.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ShedGuard> {
        self.allow().then(|| ShedGuard {
            shedder: Arc::clone(self),
        })
    }

    /// Live in-flight count.
    pub fn current(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Total requests rejected since startup.
    pub fn shed_count(&self) -> u64 {
        self.shed.load(Ordering::Relaxed)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

/// RAII guard holding one in-flight slot.
#[derive(Debug)]
pub struct ShedGuard {
    shedder: Arc<LoadShedder>,
}

impl Drop for ShedGuard {
    fn drop(&mut self) {
        self.shedder.done();
    }
}
