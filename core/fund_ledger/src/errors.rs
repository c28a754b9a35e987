//! Ledger error types.

use thiserror::Error;

use crate::types::FundKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The triggering entity asked for a non-positive amount.
    #[error("invalid amount for {kind}: {amount} (must be positive)")]
    InvalidAmount { kind: FundKind, amount: i64 },

    /// The counterpart pool does not hold the opposite kind.
    #[error("counterpart kind mismatch: expected {expected}, got {found}")]
    CounterpartKindMismatch { expected: FundKind, found: FundKind },

    /// The triggering entity was already invested or closed.
    #[error("{kind} {id} is not eligible for allocation")]
    NotEligible { kind: FundKind, id: i64 },

    /// A row changed between fetch and commit; retry from a fresh fetch.
    #[error("concurrent modification of {kind} {id}")]
    ConcurrentModification { kind: FundKind, id: i64 },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: FundKind, id: i64 },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
