//! Request and record shapes for charity projects and donations.
//!
//! Both records embed the funding columns the ledger core works on; they are
//! converted to [`Fundable`] before an allocation run.

use chrono::{DateTime, Utc};
use fund_ledger::{FundKind, Fundable};
use serde::{Deserialize, Serialize};

/// Maximum length of a project name.
pub const NAME_MAX_LEN: usize = 100;

// ─────────────────────────────────────────────────────────
// Charity projects
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectCreate {
    pub name: String,
    pub description: String,
    pub full_amount: i64,
}

/// Partial update. `full_amount` is accepted only so it can be refused with
/// a clear message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub full_amount: Option<i64>,
}

impl ProjectUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.full_amount.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ProjectRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub full_amount: i64,
    pub invested_amount: i64,
    pub fully_invested: bool,
    pub create_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_date: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub version: i64,
}

impl ProjectRecord {
    pub fn fundable(&self) -> Fundable {
        Fundable {
            id: self.id,
            kind: FundKind::CharityProject,
            full_amount: self.full_amount,
            invested_amount: self.invested_amount,
            fully_invested: self.fully_invested,
            create_date: self.create_date,
            close_date: self.close_date,
            version: self.version,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Donations
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct DonationCreate {
    pub full_amount: i64,
    pub comment: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DonationRecord {
    pub id: i64,
    pub full_amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub invested_amount: i64,
    pub fully_invested: bool,
    pub create_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_date: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub version: i64,
}

impl DonationRecord {
    pub fn fundable(&self) -> Fundable {
        Fundable {
            id: self.id,
            kind: FundKind::Donation,
            full_amount: self.full_amount,
            invested_amount: self.invested_amount,
            fully_invested: self.fully_invested,
            create_date: self.create_date,
            close_date: self.close_date,
            version: self.version,
        }
    }
}

/// Funding columns only, as read for an allocation run.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FundingRow {
    pub id: i64,
    pub full_amount: i64,
    pub invested_amount: i64,
    pub fully_invested: bool,
    pub create_date: DateTime<Utc>,
    pub close_date: Option<DateTime<Utc>>,
    pub version: i64,
}

impl FundingRow {
    pub fn into_fundable(self, kind: FundKind) -> Fundable {
        Fundable {
            id: self.id,
            kind,
            full_amount: self.full_amount,
            invested_amount: self.invested_amount,
            fully_invested: self.fully_invested,
            create_date: self.create_date,
            close_date: self.close_date,
            version: self.version,
        }
    }
}
