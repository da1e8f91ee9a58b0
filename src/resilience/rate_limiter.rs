//! Per-client token bucket rate limiting.
//!
//! Buckets live in a sharded concurrent map keyed by client identity
//! (authenticated user id, else source IP). Holding a shard entry makes
//! refill-check-decrement atomic for that client while other shards proceed.
//!
//! Refill is whole tokens only: `elapsed_minutes * requests_per_minute`
//! truncated, and `last_refill` always moves to now, so fractional credit
//! between calls is dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::observability::metrics;

/// Token bucket for one client.
#[derive(Debug, Clone, Copy)]
pub struct ClientBucket {
    pub tokens: u32,
    pub last_refill: Instant,
}

/// Limits shared by every client.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub burst_limit: u32,
    /// Buckets untouched for this long are evicted by [`RateLimiter::reap_idle`].
    pub idle_ttl: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_limit: 10,
            idle_ttl: Duration::from_secs(600),
        }
    }
}

/// In-process token bucket limiter.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, ClientBucket>,
    settings: RateLimitSettings,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            buckets: DashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Admit or reject one request from `client_id`.
    pub fn allow(&self, client_id: &str) -> bool {
        self.allow_at(client_id, Instant::now())
    }

    pub(crate) fn allow_at(&self, client_id: &str, now: Instant) -> bool {
        let burst = self.settings.burst_limit;
        let rpm = u64::from(self.settings.requests_per_minute);

        // A fresh bucket starts full and pays for the request that created it.
        let mut bucket = self
            .buckets
            .entry(client_id.to_string())
            .or_insert_with(|| ClientBucket {
                tokens: burst,
                last_refill: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let refill = (elapsed.as_secs_f64() / 60.0 * rpm as f64) as u64;
        let refilled = (u64::from(bucket.tokens) + refill).min(u64::from(burst));
        bucket.tokens = refilled as u32;
        bucket.last_refill = now;

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.buckets.len()
    }

    /// Current bucket for a client, if tracked.
    pub fn bucket(&self, client_id: &str) -> Option<ClientBucket> {
        self.buckets.get(client_id).map(|b| *b)
    }

    /// Drop buckets idle longer than the configured TTL. Returns how many went.
    pub fn reap_idle(&self) -> usize {
        self.reap_idle_at(Instant::now())
    }

    pub(crate) fn reap_idle_at(&self, now: Instant) -> usize {
        let ttl = self.settings.idle_ttl;
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < ttl);
        let removed = before.saturating_sub(self.buckets.len());
        metrics::set_limiter_clients(self.buckets.len());
        removed
    }

    /// Periodically evict idle buckets until shutdown is signalled.
    pub async fn run_reaper(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.reap_idle();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.client_count(), "Reaped idle rate limit buckets");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate limiter reaper stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rpm: u32, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimitSettings {
            requests_per_minute: rpm,
            burst_limit: burst,
            idle_ttl: Duration::from_secs(60),
        })
    }

    #[test]
    fn burst_then_reject() {
        let rl = limiter(60, 5);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(rl.allow_at("player-1", now));
        }
        assert!(!rl.allow_at("player-1", now));
    }

    #[test]
    fn clients_are_independent() {
        let rl = limiter(60, 1);
        let now = Instant::now();
        assert!(rl.allow_at("a", now));
        assert!(!rl.allow_at("a", now));
        assert!(rl.allow_at("b", now));
    }

    #[test]
    fn refills_whole_tokens_only() {
        let rl = limiter(60, 2);
        let t0 = Instant::now();
        assert!(rl.allow_at("c", t0));
        assert!(rl.allow_at("c", t0));
        assert!(!rl.allow_at("c", t0));

        // 0.5s at 1 token/s truncates to zero and the half token is lost.
        assert!(!rl.allow_at("c", t0 + Duration::from_millis(500)));
        assert!(!rl.allow_at("c", t0 + Duration::from_millis(1000)));

        assert!(rl.allow_at("c", t0 + Duration::from_millis(2100)));
    }

    #[test]
    fn refill_is_capped_at_burst() {
        let rl = limiter(600, 3);
        let t0 = Instant::now();
        assert!(rl.allow_at("d", t0));
        let later = t0 + Duration::from_secs(3600);
        for _ in 0..3 {
            assert!(rl.allow_at("d", later));
        }
        assert!(!rl.allow_at("d", later));
        assert_eq!(rl.bucket("d").map(|b| b.tokens), Some(0));
    }

    #[test]
    fn admitted_per_minute_bounded() {
        let rpm = 30;
        let burst = 5;
        let rl = limiter(rpm, burst);
        let t0 = Instant::now();
        let mut admitted = 0;
        // One call every 100ms for a minute.
        for i in 0..600u64 {
            if rl.allow_at("e", t0 + Duration::from_millis(i * 100)) {
                admitted += 1;
            }
        }
        assert!(admitted <= burst + rpm);
    }

    #[test]
    fn reaps_idle_buckets() {
        let rl = limiter(60, 5);
        let t0 = Instant::now();
        rl.allow_at("old", t0);
        rl.allow_at("new", t0 + Duration::from_secs(50));
        assert_eq!(rl.reap_idle_at(t0 + Duration::from_secs(70)), 1);
        assert!(rl.bucket("old").is_none());
        assert!(rl.bucket("new").is_some());
    }

    #[test]
    fn concurrent_callers_never_overdraw() {
        let rl = Arc::new(limiter(1, 50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                std::thread::spawn(move || (0..20).filter(|_| rl.allow("shared")).count())
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 50);
    }
}
