//! # Fund Ledger
//!
//! Core of the charity fund: allocates donations against open charity
//! projects on a strict first-open, first-served basis and keeps each
//! entity's funding state consistent.
//!
//! | Concern          | Entry point(s)                                      |
//! |------------------|-----------------------------------------------------|
//! | Matching         | [`allocate`], [`allocate_at`]                       |
//! | Closure          | [`close`], [`close_at`]                             |
//! | Consistency      | [`invariants::check_allocation`], [`invariants::check_ledger`] |
//! | Store contract   | [`LedgerStore`], [`run_allocation`], [`MemoryLedger`] |
//!
//! ## Architecture
//!
//! The engine never reads or writes storage itself. A caller fetches the
//! open counterparts, hands them to [`allocate`] together with the new
//! entity and the counterpart kind, checks the result with the consistency
//! guard and commits the mutated set atomically.
//!
//! Creating a project triggers `allocate(project, FundKind::Donation, ..)`;
//! creating a donation triggers `allocate(donation, FundKind::CharityProject, ..)`.

pub mod closure;
pub mod engine;
pub mod errors;
pub mod invariants;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_guard;
#[cfg(test)]
mod test_storage;

pub use closure::{close, close_at};
pub use engine::{allocate, allocate_at};
pub use errors::{LedgerError, Result};
pub use invariants::LedgerTotals;
pub use storage::{run_allocation, LedgerStore, MemoryLedger};
pub use types::{Allocation, FundKind, Fundable, Transfer};
