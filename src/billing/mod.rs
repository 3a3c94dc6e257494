//! Cost ledger for metered AI operations.
//!
//! Tracks per-operation spend against a fixed unit-cost table and gates
//! further metered calls behind a daily spend cap.
//!
//! ## Design
//! - Two persisted keys in the app key-value store: `cost_tracking`
//!   (recent entries, bounded to 1000) and `cost_stats` (running
//!   aggregate)
//! - Fail-open: a storage hiccup never breaks the caller or disables a
//!   paid feature; writes degrade silently, reads return safe defaults
//! - CSV export of the recent log for support and diagnostics

pub mod ledger;
pub mod pricing;

pub use ledger::{CostBreakdown, CostEntry, CostLedger, CostStats, DEFAULT_DAILY_LIMIT_USD};
pub use pricing::OperationKind;
