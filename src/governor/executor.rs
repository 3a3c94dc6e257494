//! Secure-action executor: debounce and rate limiting composed around one
//! caller-supplied async action, with error capture.
//!
//! `execute()` never panics and never returns an error: suppressed or
//! failed calls resolve to `None`, and the caller inspects the observable
//! state (`is_executing`, `is_rate_limited`, `retry_after_ms`, `error`) to
//! find out why.
//!
//! Overlap: the debounce gate is evaluated against the wall-clock time of
//! the call, and `last_execution` is stamped when execution begins. A slow
//! action therefore does not block a second call from starting once the
//! debounce window has elapsed; the executor imposes no in-flight
//! exclusivity beyond debounce timing. Whether it should is an open
//! product question; callers needing strict exclusivity must gate on
//! `is_executing` themselves.

use crate::clock::Clock;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::rate_limiter::{LimitClass, RateLimiter};

type BoxedAction<T> =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send>> + Send + Sync>;

/// Tuning for a [`SecureActionExecutor`].
#[derive(Debug, Clone)]
pub struct SecureActionOptions {
    /// Quiet period required between two executions, in milliseconds.
    pub debounce_ms: u64,
    /// Limit class checked before each run, if any.
    pub rate_limit: Option<LimitClass>,
    /// Identity key for the rate-limit window.
    pub rate_limit_key: String,
}

impl Default for SecureActionOptions {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            rate_limit: None,
            rate_limit_key: "action".to_string(),
        }
    }
}

/// Observable state shared with the auto-clear timer.
struct ExecutorState {
    executing: AtomicBool,
    rate_limited: AtomicBool,
    retry_after_ms: Mutex<Option<u64>>,
    error: Mutex<Option<Arc<anyhow::Error>>>,
    last_execution_ms: Mutex<Option<u64>>,
    clear_timer: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutorState {
    fn new() -> Self {
        Self {
            executing: AtomicBool::new(false),
            rate_limited: AtomicBool::new(false),
            retry_after_ms: Mutex::new(None),
            error: Mutex::new(None),
            last_execution_ms: Mutex::new(None),
            clear_timer: Mutex::new(None),
        }
    }
}

/// One guarded async action plus its execution state.
///
/// Construct through [`Governor::secure_action`] or
/// [`Governor::rate_limited_action`] so the executor shares the process
/// governor's limiter and clock.
///
/// [`Governor::secure_action`]: super::Governor::secure_action
/// [`Governor::rate_limited_action`]: super::Governor::rate_limited_action
pub struct SecureActionExecutor<T> {
    action: BoxedAction<T>,
    opts: SecureActionOptions,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    state: Arc<ExecutorState>,
}

impl<T: Send + 'static> SecureActionExecutor<T> {
    pub(crate) fn new<F, Fut>(
        action: F,
        opts: SecureActionOptions,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            action: Box::new(move || Box::pin(action())),
            opts,
            limiter,
            clock,
            state: Arc::new(ExecutorState::new()),
        }
    }

    /// Run the guarded action. Resolves to the action's value, or `None`
    /// when the call was debounced, rate limited, or the action failed;
    /// inspect [`error`](Self::error) and [`is_rate_limited`](Self::is_rate_limited)
    /// to tell which.
    pub async fn execute(&self) -> Option<T> {
        let now = self.clock.now_ms();

        // Debounce gate: silent suppression of rapid repeats. No error is
        // recorded and no state changes.
        if let Some(last) = *self.state.last_execution_ms.lock() {
            if now.saturating_sub(last) < self.opts.debounce_ms {
                return None;
            }
        }

        if let Some(class) = self.opts.rate_limit {
            let status = self.limiter.check(&self.opts.rate_limit_key, class);
            if status.is_limited {
                let retry_after = status.retry_after_ms.unwrap_or(0);
                self.state.rate_limited.store(true, Ordering::SeqCst);
                *self.state.retry_after_ms.lock() = Some(retry_after);
                self.schedule_clear(retry_after);
                return None;
            }
            // Fresh pass: drop any stale limited state, and cancel its
            // timer so it cannot fire on a newer limited state later.
            self.cancel_clear();
            self.state.rate_limited.store(false, Ordering::SeqCst);
            *self.state.retry_after_ms.lock() = None;
        }

        *self.state.last_execution_ms.lock() = Some(now);
        self.state.executing.store(true, Ordering::SeqCst);
        *self.state.error.lock() = None;

        let result = (self.action)().await;
        self.state.executing.store(false, Ordering::SeqCst);

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                *self.state.error.lock() = Some(Arc::new(e));
                None
            }
        }
    }

    /// Whether an action run is currently in flight.
    pub fn is_executing(&self) -> bool {
        self.state.executing.load(Ordering::SeqCst)
    }

    /// Whether the last check hit the rate limit (auto-clears after the
    /// window resets, or on the next passing check).
    pub fn is_rate_limited(&self) -> bool {
        self.state.rate_limited.load(Ordering::SeqCst)
    }

    /// Milliseconds until a limited window resets, if limited.
    pub fn retry_after_ms(&self) -> Option<u64> {
        *self.state.retry_after_ms.lock()
    }

    /// The failure captured from the most recent run, if any. Cleared when
    /// a new run starts.
    pub fn error(&self) -> Option<Arc<anyhow::Error>> {
        self.state.error.lock().clone()
    }

    /// Cancel the pending flag-clear timer, if any. Also runs on drop.
    pub fn dispose(&self) {
        self.cancel_clear();
    }

    fn schedule_clear(&self, retry_after_ms: u64) {
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(retry_after_ms)).await;
            state.rate_limited.store(false, Ordering::SeqCst);
            *state.retry_after_ms.lock() = None;
            state.clear_timer.lock().take();
        });
        if let Some(prev) = self.state.clear_timer.lock().replace(handle) {
            prev.abort();
        }
    }

    fn cancel_clear(&self) {
        if let Some(handle) = self.state.clear_timer.lock().take() {
            handle.abort();
        }
    }
}

impl<T> Drop for SecureActionExecutor<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.state.clear_timer.lock().take() {
            handle.abort();
        }
    }
}
