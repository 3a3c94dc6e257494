//! Per-key suppression of rapid repeated calls.
//!
//! Two flavors with opposite edges:
//! - [`Debouncer`]: trailing edge. Every call re-arms a one-shot timer for
//!   its key; only the last call in a burst fires, after the quiet period.
//!   Fire-and-forget: nothing is returned to the caller.
//! - [`Throttler`]: leading edge. The first call fires immediately; calls
//!   arriving before the minimum interval has passed are dropped (never
//!   queued) and reported back as `false`.
//!
//! At most one live timer exists per key. Timers are generation-tagged so
//! a superseded or cancelled timer can never fire on newer state.

use crate::clock::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Pending timer state for one key. The generation identifies which call
/// currently owns the slot; the handle lets a newer call abort the sleep.
struct TimerSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Per-key trailing-edge debouncer.
///
/// Must be used from within a tokio runtime; timers are spawned tasks.
#[derive(Default)]
pub struct Debouncer {
    slots: Arc<Mutex<HashMap<String, TimerSlot>>>,
    next_generation: AtomicU64,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `f` to run after `wait` of inactivity on `key`, cancelling
    /// any callback previously scheduled for the same key.
    pub fn call(&self, key: &str, wait: Duration, f: impl FnOnce() + Send + 'static) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // Claim the slot before spawning so the timer task can verify it
        // still owns the key when it wakes.
        {
            let mut slots = self.slots.lock();
            match slots.get_mut(key) {
                Some(slot) => {
                    slot.generation = generation;
                    if let Some(prev) = slot.handle.take() {
                        prev.abort();
                    }
                }
                None => {
                    slots.insert(
                        key.to_string(),
                        TimerSlot {
                            generation,
                            handle: None,
                        },
                    );
                }
            }
        }

        let slots = Arc::clone(&self.slots);
        let task_key = key.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let fire = {
                let mut slots = slots.lock();
                match slots.get(&task_key) {
                    Some(slot) if slot.generation == generation => {
                        slots.remove(&task_key);
                        true
                    }
                    _ => false,
                }
            };
            if fire {
                f();
            }
        });

        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(slot) if slot.generation == generation => slot.handle = Some(handle),
            // A newer call (or the timer itself, for a zero wait) already
            // took over; aborting a finished task is a no-op.
            _ => handle.abort(),
        }
    }

    /// Cancel every pending timer without firing it.
    pub fn cancel_all(&self) {
        for (_, slot) in self.slots.lock().drain() {
            if let Some(handle) = slot.handle {
                handle.abort();
            }
        }
    }

    /// Number of keys with a pending timer.
    pub fn pending(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Per-key leading-edge throttle.
#[derive(Clone)]
pub struct Throttler {
    clock: Arc<dyn Clock>,
    last_fired_ms: Arc<Mutex<HashMap<String, u64>>>,
}

impl Throttler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_fired_ms: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `f` now if at least `wait` has passed since the last accepted
    /// call on `key`; otherwise drop the call. Returns whether `f` ran.
    pub fn call(&self, key: &str, wait: Duration, f: impl FnOnce()) -> bool {
        let now = self.clock.now_ms();
        let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);

        let mut last = self.last_fired_ms.lock();
        if let Some(&fired) = last.get(key) {
            if now.saturating_sub(fired) < wait_ms {
                return false;
            }
        }
        last.insert(key.to_string(), now);
        drop(last);

        f();
        true
    }

    /// Forget all last-execution stamps.
    pub fn clear(&self) {
        self.last_fired_ms.lock().clear();
    }
}
