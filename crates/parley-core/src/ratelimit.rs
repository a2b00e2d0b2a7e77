//! Rate limiters (§4.3, C3), built on `governor`'s GCRA limiters rather than
//! a hand-rolled sliding window — same crate and construction shape the
//! teacher's `paracord-ws::handler` uses for its per-opcode user budgets.

use governor::state::{InMemoryState, NotKeyed};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, governor::clock::DefaultClock>;

/// Burst-`max` quota replenishing uniformly over `window`, i.e. "at most
/// `max` events per `window`" under GCRA.
fn quota(max: u32, window: Duration) -> Quota {
    let max_burst = NonZeroU32::new(max).expect("rate limit max must be nonzero");
    let replenish_1_per = window / max.max(1);
    Quota::with_period(replenish_1_per)
        .expect("rate limit window must be nonzero")
        .allow_burst(max_burst)
}

/// Pre-auth limiter keyed by remote address (§4.1: "pre-auth rate limiter
/// keyed by remote address"). Shared across all connections.
pub struct PreAuthLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl PreAuthLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            limiter: RateLimiter::keyed(quota(max, window)),
        }
    }

    /// 10 attempts per 60s, per §4.3.
    pub fn for_auth() -> Self {
        Self::new(10, Duration::from_secs(60))
    }

    pub fn check(&self, key: &str) -> bool {
        self.limiter.check_key(&key.to_string()).is_ok()
    }

    /// Periodic sweep (every 60s per §4.3/§5) of keys with no recent
    /// activity, so a long-lived server doesn't retain one entry per
    /// remote address seen since startup.
    pub fn sweep(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }
}

/// Message categories dispatched post-auth (§4.1 dispatch table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateCategory {
    Chat,
    E2ee,
    Speaking,
    Media,
    General,
}

impl RateCategory {
    /// Per-second ceiling for this category (§4.1 dispatch table).
    pub fn max_per_second(self) -> u32 {
        match self {
            RateCategory::Chat => 5,
            RateCategory::E2ee => 10,
            RateCategory::Speaking => 20,
            RateCategory::Media => 20,
            RateCategory::General => 30,
        }
    }
}

/// Per-connection, per-category budget (§3 "live connection ...
/// category-rate-counters", §4.3 "post-auth" variant). One direct limiter
/// per category rather than a single keyed one, since the category set
/// closes over this connection alone and never needs a key. Dropped with
/// the connection, so there's nothing to sweep.
pub struct ConnectionRateLimiter {
    chat: DirectLimiter,
    e2ee: DirectLimiter,
    speaking: DirectLimiter,
    media: DirectLimiter,
    general: DirectLimiter,
}

impl ConnectionRateLimiter {
    pub fn new() -> Self {
        let direct = |category: RateCategory| {
            RateLimiter::direct(quota(category.max_per_second(), Duration::from_secs(1)))
        };
        Self {
            chat: direct(RateCategory::Chat),
            e2ee: direct(RateCategory::E2ee),
            speaking: direct(RateCategory::Speaking),
            media: direct(RateCategory::Media),
            general: direct(RateCategory::General),
        }
    }

    pub fn check(&self, category: RateCategory) -> bool {
        let limiter = match category {
            RateCategory::Chat => &self.chat,
            RateCategory::E2ee => &self.e2ee,
            RateCategory::Speaking => &self.speaking,
            RateCategory::Media => &self.media,
            RateCategory::General => &self.general,
        };
        limiter.check().is_ok()
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Redeem-invite REST limiter: 20 attempts per 60s, keyed by remote IP
/// (§4.4 "Redeem invite ... IP-rate-limited 20/60s").
pub fn redeem_limiter() -> PreAuthLimiter {
    PreAuthLimiter::new(20, Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_exactly_max_events_per_window() {
        let limiter = ConnectionRateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check(RateCategory::Chat));
        }
        assert!(!limiter.check(RateCategory::Chat), "6th chat frame in the same second must be rejected");
    }

    #[test]
    fn categories_have_independent_windows() {
        let limiter = ConnectionRateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check(RateCategory::Chat));
        }
        assert!(limiter.check(RateCategory::E2ee), "a different category must not be affected");
    }

    #[test]
    fn pre_auth_limiter_rejects_after_threshold() {
        let limiter = PreAuthLimiter::for_auth();
        for _ in 0..10 {
            assert!(limiter.check("1.2.3.4"));
        }
        assert!(!limiter.check("1.2.3.4"));
        assert!(limiter.check("5.6.7.8"), "a different key has its own window");
    }

    #[test]
    fn sweep_runs_without_disturbing_live_keys() {
        let limiter = PreAuthLimiter::new(1, Duration::from_millis(50));
        assert!(limiter.check("k"));
        assert!(!limiter.check("k"), "burst of 1 is exhausted");
        std::thread::sleep(Duration::from_millis(60));
        limiter.sweep();
        assert!(limiter.check("k"), "key replenishes after its window regardless of sweeping");
    }
}
