//! # Allocation engine
//!
//! Greedy first-open, first-served matching of one new entity against the
//! open entities of the opposite kind.
//!
//! The engine is pure: it mutates the values it is handed and returns them.
//! Fetching the pool and committing the result atomically is the caller's job
//! (see [`crate::storage::run_allocation`]).

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::closure::close_at;
use crate::errors::{LedgerError, Result};
use crate::invariants::check_entity;
use crate::types::{Allocation, FundKind, Fundable, Transfer};

/// Run one allocation, stamping closures with the current time.
pub fn allocate(
    source: Fundable,
    counterpart_kind: FundKind,
    counterparts: Vec<Fundable>,
) -> Result<Allocation> {
    allocate_at(source, counterpart_kind, counterparts, Utc::now())
}

/// Run one allocation for `source` against `counterparts`.
///
/// `counterpart_kind` must be the opposite of `source.kind`. Closed entries in
/// `counterparts` are skipped; the rest are served oldest `create_date` first,
/// ties broken by `id`. Every closure performed by this run is stamped `now`.
///
/// Nothing is mutated when an error is returned.
pub fn allocate_at(
    mut source: Fundable,
    counterpart_kind: FundKind,
    counterparts: Vec<Fundable>,
    now: DateTime<Utc>,
) -> Result<Allocation> {
    if source.full_amount <= 0 {
        return Err(LedgerError::InvalidAmount {
            kind: source.kind,
            amount: source.full_amount,
        });
    }
    if counterpart_kind != source.kind.counterpart() {
        return Err(LedgerError::CounterpartKindMismatch {
            expected: source.kind.counterpart(),
            found: counterpart_kind,
        });
    }
    if source.invested_amount != 0 || source.fully_invested {
        return Err(LedgerError::NotEligible {
            kind: source.kind,
            id: source.id,
        });
    }

    let mut pool = Vec::with_capacity(counterparts.len());
    for counterpart in counterparts {
        if counterpart.kind != counterpart_kind {
            return Err(LedgerError::CounterpartKindMismatch {
                expected: counterpart_kind,
                found: counterpart.kind,
            });
        }
        check_entity(&counterpart)?;
        if counterpart.is_open() {
            pool.push(counterpart);
        }
    }
    pool.sort_by(|a, b| (a.create_date, a.id).cmp(&(b.create_date, b.id)));

    let mut available = source.full_amount;
    let mut touched = Vec::new();
    let mut transfers = Vec::new();

    for mut counterpart in pool {
        let transfer = counterpart.remaining().min(available);
        counterpart.invested_amount += transfer;
        source.invested_amount += transfer;
        available -= transfer;

        debug!(
            source_kind = %source.kind,
            source_id = source.id,
            counterpart_id = counterpart.id,
            transfer,
            available,
            "transfer"
        );
        transfers.push(Transfer {
            counterpart_id: counterpart.id,
            amount: transfer,
        });

        if counterpart.invested_amount == counterpart.full_amount {
            close_at(&mut counterpart, now);
        }
        touched.push(counterpart);

        if available == 0 {
            close_at(&mut source, now);
            break;
        }
    }

    Ok(Allocation {
        source,
        touched,
        transfers,
    })
}
