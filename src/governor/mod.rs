//! Usage governor: rate limiting, debounce/throttle, and the secure-action
//! executor that composes them around costly operations.
//!
//! ## Design
//! - One [`Governor`] per process (or per test) owns every piece of mutable
//!   governance state: rate-limit windows, debounce timers, throttle
//!   stamps. No module-level globals, so tests and logout flows get clean
//!   isolation through `Governor::new`/`reset`.
//! - Checks are synchronous and never suspend; only the wrapped actions do.
//! - Scheduled flag-clear timers are tracked per owner so a superseded
//!   timer is cancelled instead of firing on newer state.

pub mod debounce;
pub mod executor;
pub mod rate_limiter;

pub use debounce::{Debouncer, Throttler};
pub use executor::{SecureActionExecutor, SecureActionOptions};
pub use rate_limiter::{LimitClass, RateLimitStatus, RateLimiter};

use crate::clock::{Clock, SystemClock};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// The composed usage governor guarding costly or abusable operations.
pub struct Governor {
    clock: Arc<dyn Clock>,
    limiter: Arc<RateLimiter>,
    debouncer: Debouncer,
    throttler: Throttler,
}

impl Governor {
    /// Governor on the system wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Governor on an injected clock (tests).
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new(Arc::clone(&clock))),
            debouncer: Debouncer::new(),
            throttler: Throttler::new(Arc::clone(&clock)),
            clock,
        }
    }

    /// Check (and count) one request for `key` under `class`.
    pub fn check_rate_limit(&self, key: &str, class: LimitClass) -> RateLimitStatus {
        self.limiter.check(key, class)
    }

    /// Drop all rate-limit windows (logout / test reset).
    pub fn clear_rate_limits(&self) {
        self.limiter.clear();
    }

    /// Trailing-edge debounce: run `f` after `wait` of inactivity on
    /// `key`, replacing any previously scheduled callback for that key.
    pub fn debounce(&self, key: &str, wait: Duration, f: impl FnOnce() + Send + 'static) {
        self.debouncer.call(key, wait, f);
    }

    /// Leading-edge throttle: run `f` now unless a call on `key` was
    /// accepted less than `wait` ago. Returns whether `f` ran.
    pub fn throttle(&self, key: &str, wait: Duration, f: impl FnOnce()) -> bool {
        self.throttler.call(key, wait, f)
    }

    /// Wrap `action` with debouncing, optional rate limiting, and error
    /// capture. The executor shares this governor's limiter and clock.
    pub fn secure_action<T, F, Fut>(
        &self,
        action: F,
        opts: SecureActionOptions,
    ) -> SecureActionExecutor<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        SecureActionExecutor::new(action, opts, Arc::clone(&self.limiter), Arc::clone(&self.clock))
    }

    /// Wrap `action` with rate limiting only (no debounce window).
    pub fn rate_limited_action<T, F, Fut>(
        &self,
        key: &str,
        class: LimitClass,
        action: F,
    ) -> SecureActionExecutor<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.secure_action(
            action,
            SecureActionOptions {
                debounce_ms: 0,
                rate_limit: Some(class),
                rate_limit_key: key.to_string(),
            },
        )
    }

    /// Full lifecycle reset: rate windows, throttle stamps, and pending
    /// debounce timers. Executors keep their own per-instance state.
    pub fn reset(&self) {
        self.limiter.clear();
        self.throttler.clear();
        self.debouncer.cancel_all();
    }
}

impl Default for Governor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn governors_are_isolated() {
        let clock = Arc::new(ManualClock::new(0));
        let a = Governor::with_clock(clock.clone());
        let b = Governor::with_clock(clock);

        for _ in 0..3 {
            a.check_rate_limit("payment_xyz", LimitClass::Payment);
        }
        assert!(a.check_rate_limit("payment_xyz", LimitClass::Payment).is_limited);
        assert!(!b.check_rate_limit("payment_xyz", LimitClass::Payment).is_limited);
    }

    #[tokio::test]
    async fn reset_restores_a_clean_slate() {
        let clock = ManualClock::new(0);
        let governor = Governor::with_clock(Arc::new(clock));
        let fired = Arc::new(AtomicU32::new(0));

        for _ in 0..4 {
            governor.check_rate_limit("k", LimitClass::Payment);
        }
        assert!(governor.check_rate_limit("k", LimitClass::Payment).is_limited);
        assert!(governor.throttle("t", Duration::from_secs(10), || {}));
        assert!(!governor.throttle("t", Duration::from_secs(10), || {}));
        {
            let fired = Arc::clone(&fired);
            governor.debounce("d", Duration::from_millis(30), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        governor.reset();

        assert!(!governor.check_rate_limit("k", LimitClass::Payment).is_limited);
        assert!(governor.throttle("t", Duration::from_secs(10), || {}));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn guarded_vision_call_end_to_end() {
        // The shape the client uses: a debounced, AI-rate-limited call that
        // can fail without taking the screen down with it.
        let clock = ManualClock::new(1_000_000);
        let governor = Governor::with_clock(Arc::new(clock.clone()));
        let calls = Arc::new(AtomicU32::new(0));

        let measure_room = {
            let calls = Arc::clone(&calls);
            governor.secure_action(
                move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, anyhow::Error>("12.5 sqm")
                    }
                },
                SecureActionOptions {
                    debounce_ms: 500,
                    rate_limit: Some(LimitClass::AiCall),
                    rate_limit_key: "room_measure".to_string(),
                },
            )
        };

        // Double-tap: one real call.
        assert_eq!(measure_room.execute().await, Some("12.5 sqm"));
        assert_eq!(measure_room.execute().await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Spaced taps drain the window, then the limiter takes over.
        for _ in 0..9 {
            clock.advance(600);
            assert_eq!(measure_room.execute().await, Some("12.5 sqm"));
        }
        clock.advance(600);
        assert_eq!(measure_room.execute().await, None);
        assert!(measure_room.is_rate_limited());
        assert!(measure_room.retry_after_ms().unwrap() > 0);

        measure_room.dispose();
    }
}
