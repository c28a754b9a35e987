//! # Types
//!
//! Shared data structures used across the ledger core.
//!
//! ## Design decisions
//!
//! ### One funding shape, two kinds
//!
//! Charity projects and donations carry the same funding fields. The core
//! only ever sees them as a [`Fundable`] tagged with a [`FundKind`]; the
//! kind-specific columns (project name, donation comment, ...) stay with the
//! service layer.
//!
//! ### Lifecycle
//!
//! A fundable moves forward only:
//!
//! ```text
//! Open (invested = 0) ──► Open (0 < invested < full) ──► Closed (invested = full)
//!        └────────────────────────────────────────────────►┘
//! ```
//!
//! `Closed` is terminal: `fully_invested` never resets and `close_date` is
//! stamped exactly once.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two sides of the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundKind {
    /// A funding request that needs `full_amount`.
    CharityProject,
    /// Money given to the fund, `full_amount` is the donated sum.
    Donation,
}

impl FundKind {
    /// The kind whose open entities form the matching pool for this kind.
    pub fn counterpart(self) -> Self {
        match self {
            Self::CharityProject => Self::Donation,
            Self::Donation => Self::CharityProject,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CharityProject => "charity_project",
            Self::Donation => "donation",
        }
    }
}

impl fmt::Display for FundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Funding state of a single project or donation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fundable {
    /// Identifier, unique within its kind.
    pub id: i64,
    pub kind: FundKind,
    /// Target amount (needed for a project, donated for a donation).
    pub full_amount: i64,
    /// Amount already matched against the other side.
    pub invested_amount: i64,
    pub fully_invested: bool,
    /// Defines the matching order: oldest open entity is served first.
    pub create_date: DateTime<Utc>,
    /// Set exactly when `fully_invested` becomes true.
    pub close_date: Option<DateTime<Utc>>,
    /// Optimistic concurrency stamp, bumped by the store on every committed write.
    pub version: i64,
}

impl Fundable {
    /// A freshly created, untouched entity.
    pub fn new(id: i64, kind: FundKind, full_amount: i64, create_date: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            full_amount,
            invested_amount: 0,
            fully_invested: false,
            create_date,
            close_date: None,
            version: 0,
        }
    }

    /// Amount still missing before the entity is fully invested.
    pub fn remaining(&self) -> i64 {
        self.full_amount - self.invested_amount
    }

    pub fn is_open(&self) -> bool {
        !self.fully_invested
    }

    /// Ledger-wide identity: ids are only unique per kind.
    pub fn key(&self) -> (FundKind, i64) {
        (self.kind, self.id)
    }
}

/// One movement of money between the triggering entity and a counterpart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub counterpart_id: i64,
    pub amount: i64,
}

/// Outcome of one allocation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// The triggering entity after the run.
    pub source: Fundable,
    /// Every counterpart that received money, in FIFO order.
    pub touched: Vec<Fundable>,
    /// Transfers in the order they were made.
    pub transfers: Vec<Transfer>,
}

impl Allocation {
    pub fn total_transferred(&self) -> i64 {
        self.transfers.iter().map(|t| t.amount).sum()
    }

    /// Whether the run moved any money at all.
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// The set the caller must persist: touched counterparts, plus the
    /// source when it received anything.
    pub fn mutated(&self) -> Vec<Fundable> {
        let mut out = self.touched.clone();
        if self.source.invested_amount > 0 {
            out.push(self.source.clone());
        }
        out
    }
}
