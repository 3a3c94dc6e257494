//! Fixed-window rate limiting keyed by (identity, limit class).
//!
//! A window is created lazily on the first check and lives until its fixed
//! reset instant; the reset time is never extended by later traffic.
//! Known limitation of the fixed-window algorithm: a burst of
//! `max_requests` at the tail of one window followed by another burst at
//! the head of the next is allowed, up to 2x the nominal rate across the
//! boundary.

use crate::clock::Clock;
use crate::error::GovernorError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Named limit configuration for a class of guarded operations.
///
/// The set is fixed at compile time; callers going through the string
/// boundary (config, UI shell) get a fail-fast error for unknown names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitClass {
    /// AI vision calls (room measurement, photo validation).
    AiCall,
    /// In-app purchase attempts.
    Payment,
    /// AI image generation.
    ImageGeneration,
    /// General backend API calls.
    ApiCall,
}

impl LimitClass {
    /// Maximum requests allowed inside one window.
    pub const fn max_requests(self) -> u32 {
        match self {
            Self::AiCall => 10,
            Self::Payment => 3,
            Self::ImageGeneration => 5,
            Self::ApiCall => 30,
        }
    }

    /// Window length in milliseconds.
    pub const fn window_ms(self) -> u64 {
        match self {
            Self::AiCall => 60_000,
            Self::Payment => 30_000,
            Self::ImageGeneration => 60_000,
            Self::ApiCall => 60_000,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AiCall => "AI_CALL",
            Self::Payment => "PAYMENT",
            Self::ImageGeneration => "IMAGE_GENERATION",
            Self::ApiCall => "API_CALL",
        }
    }
}

impl std::fmt::Display for LimitClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitClass {
    type Err = GovernorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AI_CALL" => Ok(Self::AiCall),
            "PAYMENT" => Ok(Self::Payment),
            "IMAGE_GENERATION" => Ok(Self::ImageGeneration),
            "API_CALL" => Ok(Self::ApiCall),
            other => Err(GovernorError::UnknownLimitClass(other.to_string())),
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Whether the request must be suppressed.
    pub is_limited: bool,
    /// Milliseconds until the window resets. Present only when limited.
    pub retry_after_ms: Option<u64>,
}

impl RateLimitStatus {
    const ALLOWED: Self = Self {
        is_limited: false,
        retry_after_ms: None,
    };
}

/// One fixed counting window. `reset_at_ms` is set at creation and never
/// moves; `count` never exceeds the class maximum.
#[derive(Debug, Clone)]
struct RateLimitWindow {
    count: u32,
    reset_at_ms: u64,
}

/// Fixed-window request limiter.
///
/// Windows are owned exclusively by the internal map and never handed out
/// by reference. All state for all keys lives in this instance; construct
/// one per process (normally via the governor) and share it.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    /// Windows keyed `"{class}:{identity}"`.
    windows: Mutex<HashMap<String, RateLimitWindow>>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check (and count) one request for `key` under `class`.
    ///
    /// A fresh or expired window starts at count 1 and allows the request.
    /// A full window suppresses the request without incrementing, so
    /// hammering a limited key never extends the suppression.
    pub fn check(&self, key: &str, class: LimitClass) -> RateLimitStatus {
        let now = self.clock.now_ms();
        let mut windows = self.windows.lock();
        let map_key = format!("{class}:{key}");

        if let Some(window) = windows.get_mut(&map_key) {
            if now < window.reset_at_ms {
                if window.count >= class.max_requests() {
                    return RateLimitStatus {
                        is_limited: true,
                        retry_after_ms: Some(window.reset_at_ms - now),
                    };
                }
                window.count += 1;
                return RateLimitStatus::ALLOWED;
            }
        }

        windows.insert(
            map_key,
            RateLimitWindow {
                count: 1,
                reset_at_ms: now + class.window_ms(),
            },
        );
        RateLimitStatus::ALLOWED
    }

    /// Drop the window for one (identity, class) pair.
    pub fn clear_key(&self, key: &str, class: LimitClass) {
        self.windows.lock().remove(&format!("{class}:{key}"));
    }

    /// Drop all windows (logout / test isolation).
    pub fn clear(&self) {
        self.windows.lock().clear();
    }

    /// Number of live windows.
    pub fn tracked_windows(&self) -> usize {
        self.windows.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter_at(start_ms: u64) -> (ManualClock, RateLimiter) {
        let clock = ManualClock::new(start_ms);
        let limiter = RateLimiter::new(Arc::new(clock.clone()));
        (clock, limiter)
    }

    #[test]
    fn allows_up_to_max_then_limits() {
        let (_clock, limiter) = limiter_at(1_000);

        for i in 0..LimitClass::AiCall.max_requests() {
            let status = limiter.check("user_1", LimitClass::AiCall);
            assert!(!status.is_limited, "call {i} should pass");
        }

        let status = limiter.check("user_1", LimitClass::AiCall);
        assert!(status.is_limited);
        assert!(status.retry_after_ms.unwrap() > 0);
    }

    #[test]
    fn limited_checks_do_not_extend_the_window() {
        let (clock, limiter) = limiter_at(1_000);

        for _ in 0..3 {
            limiter.check("payment_xyz", LimitClass::Payment);
        }

        let first_denial = limiter.check("payment_xyz", LimitClass::Payment);
        clock.advance(10_000);
        let later_denial = limiter.check("payment_xyz", LimitClass::Payment);

        // retry_after shrinks as the fixed reset instant approaches.
        assert_eq!(first_denial.retry_after_ms, Some(30_000));
        assert_eq!(later_denial.retry_after_ms, Some(20_000));
    }

    #[test]
    fn window_resets_after_expiry() {
        let (clock, limiter) = limiter_at(1_000);

        for _ in 0..3 {
            limiter.check("payment_xyz", LimitClass::Payment);
        }
        assert!(limiter.check("payment_xyz", LimitClass::Payment).is_limited);

        clock.advance(LimitClass::Payment.window_ms());

        let status = limiter.check("payment_xyz", LimitClass::Payment);
        assert!(!status.is_limited);
        // Fresh window: two more fit before the limit trips again.
        assert!(!limiter.check("payment_xyz", LimitClass::Payment).is_limited);
        assert!(!limiter.check("payment_xyz", LimitClass::Payment).is_limited);
        assert!(limiter.check("payment_xyz", LimitClass::Payment).is_limited);
    }

    #[test]
    fn payment_scenario_three_pass_fourth_limited() {
        let (_clock, limiter) = limiter_at(50_000);

        for _ in 0..3 {
            assert!(!limiter.check("payment_xyz", LimitClass::Payment).is_limited);
        }

        let status = limiter.check("payment_xyz", LimitClass::Payment);
        assert!(status.is_limited);
        let retry = status.retry_after_ms.unwrap();
        assert!((29_000..=30_000).contains(&retry), "retry was {retry}");
    }

    #[test]
    fn keys_and_classes_are_independent() {
        let (_clock, limiter) = limiter_at(0);

        for _ in 0..3 {
            limiter.check("user_a", LimitClass::Payment);
        }
        assert!(limiter.check("user_a", LimitClass::Payment).is_limited);

        // Same key, different class: separate window.
        assert!(!limiter.check("user_a", LimitClass::AiCall).is_limited);
        // Same class, different key: separate window.
        assert!(!limiter.check("user_b", LimitClass::Payment).is_limited);
    }

    #[test]
    fn boundary_burst_allows_double_rate() {
        // Documented fixed-window behavior: a full window right before the
        // boundary plus a full window right after is permitted.
        let (clock, limiter) = limiter_at(0);

        for _ in 0..5 {
            assert!(!limiter.check("k", LimitClass::ImageGeneration).is_limited);
        }
        clock.advance(LimitClass::ImageGeneration.window_ms());
        for _ in 0..5 {
            assert!(!limiter.check("k", LimitClass::ImageGeneration).is_limited);
        }
    }

    #[test]
    fn clear_drops_windows() {
        let (_clock, limiter) = limiter_at(0);

        for _ in 0..4 {
            limiter.check("k", LimitClass::Payment);
        }
        assert!(limiter.check("k", LimitClass::Payment).is_limited);
        assert_eq!(limiter.tracked_windows(), 1);

        limiter.clear();
        assert_eq!(limiter.tracked_windows(), 0);
        assert!(!limiter.check("k", LimitClass::Payment).is_limited);
    }

    #[test]
    fn clear_key_only_touches_that_pair() {
        let (_clock, limiter) = limiter_at(0);

        limiter.check("a", LimitClass::Payment);
        limiter.check("b", LimitClass::Payment);
        assert_eq!(limiter.tracked_windows(), 2);

        limiter.clear_key("a", LimitClass::Payment);
        assert_eq!(limiter.tracked_windows(), 1);
    }

    #[test]
    fn limit_class_string_round_trip() {
        for class in [
            LimitClass::AiCall,
            LimitClass::Payment,
            LimitClass::ImageGeneration,
            LimitClass::ApiCall,
        ] {
            assert_eq!(class.as_str().parse::<LimitClass>().unwrap(), class);
        }
    }

    #[test]
    fn unknown_limit_class_fails_fast() {
        let err = "FAX_CALL".parse::<LimitClass>().unwrap_err();
        assert_eq!(err, GovernorError::UnknownLimitClass("FAX_CALL".into()));
    }

    #[test]
    fn configured_table_matches_product_limits() {
        assert_eq!(LimitClass::AiCall.max_requests(), 10);
        assert_eq!(LimitClass::AiCall.window_ms(), 60_000);
        assert_eq!(LimitClass::Payment.max_requests(), 3);
        assert_eq!(LimitClass::Payment.window_ms(), 30_000);
        assert_eq!(LimitClass::ImageGeneration.max_requests(), 5);
        assert_eq!(LimitClass::ImageGeneration.window_ms(), 60_000);
        assert_eq!(LimitClass::ApiCall.max_requests(), 30);
        assert_eq!(LimitClass::ApiCall.window_ms(), 60_000);
    }
}
