//! Typed errors for the governance core.
//!
//! These are configuration mistakes: asking for a limit class or operation
//! kind that has no configured table entry. They fail fast at the string
//! boundary rather than silently defaulting to "unlimited" or "free".
//! Rate-limit and debounce suppressions are NOT errors; they surface as
//! `None` results plus observable flags on the executor.

use thiserror::Error;

/// Configuration errors raised when parsing limit-class or operation-kind
/// names supplied by config files or the UI shell.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GovernorError {
    /// No rate-limit window is configured under this name.
    #[error("unknown limit class: {0}")]
    UnknownLimitClass(String),

    /// No unit cost is configured under this name.
    #[error("unknown operation kind: {0}")]
    UnknownOperationKind(String),
}
