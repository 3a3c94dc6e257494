#![forbid(unsafe_code)]

//! TradeGuard: usage governance for the TradeQuote mobile client.
//!
//! Guards costly or abusable operations (AI vision calls, in-app purchase
//! attempts) against duplicate invocation, burst abuse, and unbounded
//! spend. The client's event-driven UI can fire the same handler many
//! times in quick succession and while a prior call is still in flight;
//! everything here is safe under that kind of overlapping use and never
//! crashes the caller.
//!
//! ## Design
//! - Fixed-window rate limiting keyed by (identity, limit class)
//! - Per-key debounce and throttle primitives with cancellable timers
//! - A secure-action executor composing both around an async action,
//!   surfacing failures as observable state instead of panics
//! - An append-bounded cost ledger with a daily spend gate, persisted
//!   through a pluggable string-keyed store
//!
//! All mutable state lives in an explicit [`Governor`] (or [`CostLedger`])
//! instance rather than module-level globals, so tests and logout flows
//! get clean isolation for free.

pub mod billing;
pub mod clock;
pub mod error;
pub mod governor;
pub mod storage;

pub use billing::{CostBreakdown, CostEntry, CostLedger, CostStats, OperationKind, DEFAULT_DAILY_LIMIT_USD};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::GovernorError;
pub use governor::{
    Debouncer, Governor, LimitClass, RateLimitStatus, RateLimiter, SecureActionExecutor,
    SecureActionOptions, Throttler,
};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
