//! Consistency guard.
//!
//! Checks that must hold for every entity at rest and for every allocation
//! run. Each check returns [`LedgerError::InvariantViolation`] instead of
//! panicking so the caller can refuse to commit.

use std::collections::HashMap;

use serde::Serialize;

use crate::errors::{LedgerError, Result};
use crate::types::{Allocation, FundKind, Fundable};

fn violation(msg: String) -> LedgerError {
    LedgerError::InvariantViolation(msg)
}

/// Invested amount stays within `0..=full_amount`.
pub fn check_invested_bounds(entity: &Fundable) -> Result<()> {
    if entity.invested_amount < 0 || entity.invested_amount > entity.full_amount {
        return Err(violation(format!(
            "{} {} has invested {} outside 0..={}",
            entity.kind, entity.id, entity.invested_amount, entity.full_amount
        )));
    }
    Ok(())
}

/// `fully_invested` holds exactly when the entity is full.
pub fn check_closed_iff_full(entity: &Fundable) -> Result<()> {
    let full = entity.invested_amount == entity.full_amount;
    if entity.fully_invested != full {
        return Err(violation(format!(
            "{} {} has fully_invested={} with {}/{} invested",
            entity.kind, entity.id, entity.fully_invested, entity.invested_amount, entity.full_amount
        )));
    }
    Ok(())
}

/// `close_date` is set exactly when the entity is closed.
pub fn check_close_date(entity: &Fundable) -> Result<()> {
    if entity.close_date.is_some() != entity.fully_invested {
        return Err(violation(format!(
            "{} {} has fully_invested={} but close_date={:?}",
            entity.kind, entity.id, entity.fully_invested, entity.close_date
        )));
    }
    Ok(())
}

/// Run all per-entity checks.
pub fn check_entity(entity: &Fundable) -> Result<()> {
    if entity.full_amount <= 0 {
        return Err(violation(format!(
            "{} {} has non-positive full_amount ({})",
            entity.kind, entity.id, entity.full_amount
        )));
    }
    check_invested_bounds(entity)?;
    check_closed_iff_full(entity)?;
    check_close_date(entity)
}

/// Compare one entity before and after a run.
///
/// Identity and target fields never change, invested money never decreases,
/// and a closed entity is not touched at all.
pub fn check_transition(before: &Fundable, after: &Fundable) -> Result<()> {
    if before.key() != after.key()
        || before.full_amount != after.full_amount
        || before.create_date != after.create_date
    {
        return Err(violation(format!(
            "{} {} changed immutable fields",
            before.kind, before.id
        )));
    }
    if after.invested_amount < before.invested_amount {
        return Err(violation(format!(
            "{} {} invested decreased from {} to {}",
            before.kind, before.id, before.invested_amount, after.invested_amount
        )));
    }
    if before.fully_invested && before != after {
        return Err(violation(format!(
            "{} {} was closed and got mutated",
            before.kind, before.id
        )));
    }
    Ok(())
}

/// Money moved into projects equals money moved out of donations.
pub fn check_conservation(before: &[Fundable], after: &[Fundable]) -> Result<()> {
    let before_sum = invested_by_kind(before);
    let after_sum = invested_by_kind(after);
    let delta = |kind: FundKind| {
        after_sum.get(&kind).copied().unwrap_or(0) - before_sum.get(&kind).copied().unwrap_or(0)
    };
    let projects = delta(FundKind::CharityProject);
    let donations = delta(FundKind::Donation);
    if projects != donations {
        return Err(violation(format!(
            "money not conserved: projects moved {projects}, donations moved {donations}"
        )));
    }
    Ok(())
}

/// Full check of one allocation run against the snapshot it started from.
///
/// `before` must contain the source and every counterpart handed to the
/// engine, as they were before the run.
pub fn check_allocation(before: &[Fundable], allocation: &Allocation) -> Result<()> {
    let index: HashMap<(FundKind, i64), &Fundable> =
        before.iter().map(|f| (f.key(), f)).collect();

    let mutated = allocation.mutated();
    let mut prior = Vec::with_capacity(mutated.len());
    for after in &mutated {
        let Some(orig) = index.get(&after.key()) else {
            return Err(violation(format!(
                "{} {} was mutated but is not part of the snapshot",
                after.kind, after.id
            )));
        };
        check_transition(orig, after)?;
        check_entity(after)?;
        prior.push((*orig).clone());
    }
    check_conservation(&prior, &mutated)?;

    let transferred = allocation.total_transferred();
    if transferred != allocation.source.invested_amount {
        return Err(violation(format!(
            "transfers sum to {transferred} but source invested {}",
            allocation.source.invested_amount
        )));
    }
    Ok(())
}

/// Totals over a whole ledger snapshot.
///
/// Sums are `i128`: many `i64` amounts together can exceed `i64::MAX`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerTotals {
    pub projects_invested: i128,
    pub donations_invested: i128,
    pub open_projects: usize,
    pub open_donations: usize,
}

impl LedgerTotals {
    pub fn from_entities<'a>(entities: impl IntoIterator<Item = &'a Fundable>) -> Self {
        let mut totals = Self::default();
        for f in entities {
            match f.kind {
                FundKind::CharityProject => {
                    totals.projects_invested += i128::from(f.invested_amount);
                    totals.open_projects += usize::from(f.is_open());
                }
                FundKind::Donation => {
                    totals.donations_invested += i128::from(f.invested_amount);
                    totals.open_donations += usize::from(f.is_open());
                }
            }
        }
        totals
    }

    pub fn is_balanced(&self) -> bool {
        self.projects_invested == self.donations_invested
    }
}

/// Check every entity of a full snapshot and that both sides balance.
pub fn check_ledger(entities: &[Fundable]) -> Result<LedgerTotals> {
    for entity in entities {
        check_entity(entity)?;
    }
    let totals = LedgerTotals::from_entities(entities);
    if !totals.is_balanced() {
        return Err(violation(format!(
            "ledger unbalanced: projects {} vs donations {}",
            totals.projects_invested, totals.donations_invested
        )));
    }
    Ok(totals)
}

fn invested_by_kind(entities: &[Fundable]) -> HashMap<FundKind, i128> {
    let mut sums = HashMap::new();
    for f in entities {
        *sums.entry(f.kind).or_insert(0) += i128::from(f.invested_amount);
    }
    sums
}
