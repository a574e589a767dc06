//! Fixed-window token budget shared by every call a client makes.
//!
//! The budget is process-local and deliberately below the provider's
//! documented ceiling. After each response the local view is reconciled
//! against the provider's `RateLimit-Remaining` / `RateLimit-Reset` headers:
//! the counter may only move down and the reset instant may only move later,
//! so skew between instances always errs on the conservative side.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Budget configuration for one upstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Calls allowed per window.
    pub max_tokens: u32,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Extra wait added after the window reset before retrying (ms).
    pub safety_margin_ms: u64,
}

impl RateLimitPolicy {
    /// Stats provider documents 300 requests per 5 minutes per key.
    pub const fn stats_default() -> Self {
        Self {
            max_tokens: 240,
            window_secs: 300,
            safety_margin_ms: 1_000,
        }
    }

    /// Identity provider allows roughly 600 lookups per 10 minutes per IP.
    pub const fn identity_default() -> Self {
        Self {
            max_tokens: 500,
            window_secs: 600,
            safety_margin_ms: 1_000,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs.min(i64::MAX as u64) as i64)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::milliseconds(
            self.safety_margin_ms.min(i64::MAX as u64) as i64,
        )
    }

    fn capacity(&self) -> u32 {
        self.max_tokens.max(1)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::stats_default()
    }
}

/// Outcome of trying to take a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reservation {
    Granted { remaining: u32 },
    /// No token left: sleep until `until`, then call
    /// [`RateWindow::expire`] with `window_reset_at`.
    Wait {
        until: DateTime<Utc>,
        window_reset_at: DateTime<Utc>,
    },
}

#[derive(Clone, Debug)]
pub struct RateWindow {
    policy: RateLimitPolicy,
    reset_at: DateTime<Utc>,
    remaining: u32,
}

impl RateWindow {
    /// A fresh window starts already expired so the first reservation opens
    /// it at the caller's "now".
    pub fn new(policy: RateLimitPolicy, now: DateTime<Utc>) -> Self {
        Self {
            policy,
            reset_at: now,
            remaining: 0,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    pub fn reserve(&mut self, now: DateTime<Utc>) -> Reservation {
        if now >= self.reset_at {
            self.open(now);
        }

        if self.remaining == 0 {
            return Reservation::Wait {
                until: self.reset_at + self.policy.safety_margin(),
                window_reset_at: self.reset_at,
            };
        }

        self.remaining -= 1;
        Reservation::Granted {
            remaining: self.remaining,
        }
    }

    /// Forces a new window after a waiter slept past `observed_reset_at`.
    /// No-op when another waiter (or a header) already moved the window.
    pub fn expire(&mut self, observed_reset_at: DateTime<Utc>, now: DateTime<Utc>) {
        if self.reset_at == observed_reset_at {
            self.open(now);
        }
    }

    /// Folds the provider's view into the local one.
    pub fn reconcile(
        &mut self,
        now: DateTime<Utc>,
        remaining: Option<u32>,
        reset_in_secs: Option<u64>,
    ) {
        if let Some(remaining) = remaining {
            self.remaining = self.remaining.min(remaining);
        }

        if let Some(secs) = reset_in_secs {
            let secs = secs.min(i64::MAX as u64 / 1_000) as i64;
            let candidate = now + Duration::seconds(secs);
            if candidate > self.reset_at {
                self.reset_at = candidate;
            }
        }
    }

    fn open(&mut self, now: DateTime<Utc>) {
        self.remaining = self.policy.capacity();
        self.reset_at = now + self.policy.window();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(max_tokens: u32) -> RateLimitPolicy {
        RateLimitPolicy {
            max_tokens,
            window_secs: 300,
            safety_margin_ms: 500,
        }
    }

    #[test]
    fn first_reservation_opens_a_full_window() {
        let now = Utc::now();
        let mut window = RateWindow::new(policy(3), now);

        assert_eq!(
            window.reserve(now),
            Reservation::Granted { remaining: 2 }
        );
        assert_eq!(window.reset_at(), now + Duration::seconds(300));
    }

    #[test]
    fn exhausted_window_asks_caller_to_wait_past_reset() {
        let now = Utc::now();
        let mut window = RateWindow::new(policy(2), now);
        window.reserve(now);
        window.reserve(now);

        match window.reserve(now + Duration::seconds(10)) {
            Reservation::Wait {
                until,
                window_reset_at,
            } => {
                assert_eq!(window_reset_at, now + Duration::seconds(300));
                assert_eq!(
                    until,
                    window_reset_at + Duration::milliseconds(500)
                );
            }
            other => panic!("expected wait, got {other:?}"),
        }
    }

    #[test]
    fn window_refills_once_reset_passes() {
        let now = Utc::now();
        let mut window = RateWindow::new(policy(1), now);
        window.reserve(now);

        let later = now + Duration::seconds(301);
        assert!(matches!(
            window.reserve(later),
            Reservation::Granted { remaining: 0 }
        ));
    }

    #[test]
    fn reconcile_only_lowers_remaining_and_only_extends_reset() {
        let now = Utc::now();
        let mut window = RateWindow::new(policy(10), now);
        window.reserve(now);
        assert_eq!(window.remaining(), 9);

        window.reconcile(now, Some(50), Some(10));
        assert_eq!(window.remaining(), 9, "header must not raise budget");
        assert_eq!(
            window.reset_at(),
            now + Duration::seconds(300),
            "header must not shrink window"
        );

        window.reconcile(now, Some(4), Some(600));
        assert_eq!(window.remaining(), 4);
        assert_eq!(window.reset_at(), now + Duration::seconds(600));
    }

    #[test]
    fn expire_ignores_stale_observations() {
        let now = Utc::now();
        let mut window = RateWindow::new(policy(1), now);
        window.reserve(now);
        let observed = window.reset_at();

        window.reconcile(now, None, Some(900));
        window.expire(observed, now + Duration::seconds(301));
        assert_eq!(window.remaining(), 0);

        window.expire(window.reset_at(), now + Duration::seconds(901));
        assert_eq!(window.remaining(), 1);
    }

    proptest! {
        #[test]
        fn grants_within_one_window_never_exceed_budget(
            max_tokens in 1u32..50,
            offsets in proptest::collection::vec(0i64..299_000, 0..200),
            headers in proptest::collection::vec(
                (proptest::option::of(0u32..100), proptest::option::of(0u64..900)),
                0..200,
            ),
        ) {
            let start = Utc::now();
            let mut window = RateWindow::new(policy(max_tokens), start);
            let mut sorted = offsets;
            sorted.sort_unstable();

            let mut granted = 0u32;
            for (i, offset) in sorted.iter().enumerate() {
                let now = start + Duration::milliseconds(*offset);
                if let Reservation::Granted { .. } = window.reserve(now) {
                    granted += 1;
                }
                if let Some((remaining, reset)) = headers.get(i) {
                    window.reconcile(now, *remaining, *reset);
                }
            }

            prop_assert!(granted <= max_tokens);
        }
    }
}
