//! # Storage
//!
//! The contract the allocation core needs from a ledger store, plus an
//! in-memory implementation.
//!
//! ## Store operations
//!
//! | Operation          | Guarantee                                                   |
//! |--------------------|-------------------------------------------------------------|
//! | `fetch_open(kind)` | open entities of `kind`, `create_date` then `id` ascending  |
//! | `commit(mutated)`  | all-or-nothing write, versions checked per row              |
//!
//! ## Versioning
//!
//! Every row carries a `version`. `commit` accepts a mutated entity only if
//! the stored row still has the version the entity was fetched with, then
//! bumps it. A mismatch on any row rejects the whole batch with
//! [`LedgerError::ConcurrentModification`]; the caller retries from a fresh
//! fetch.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::engine::allocate_at;
use crate::errors::{LedgerError, Result};
use crate::invariants::check_allocation;
use crate::types::{Allocation, FundKind, Fundable};

/// Durable collection of projects and donations as seen by the core.
pub trait LedgerStore {
    /// Open entities of `kind`, oldest first.
    fn fetch_open(&self, kind: FundKind) -> Result<Vec<Fundable>>;

    /// Persist the mutated set atomically.
    fn commit(&self, mutated: &[Fundable]) -> Result<()>;
}

/// Fetch the open counterparts, allocate, guard and commit.
///
/// `source` must already be stored with zero investment. Errors leave the
/// store untouched.
pub fn run_allocation<S>(store: &S, source: Fundable, counterpart_kind: FundKind) -> Result<Allocation>
where
    S: LedgerStore + ?Sized,
{
    let counterparts = store.fetch_open(counterpart_kind)?;
    let allocation = allocate_guarded(source, counterpart_kind, counterparts, Utc::now())?;
    store.commit(&allocation.mutated())?;
    Ok(allocation)
}

fn allocate_guarded(
    source: Fundable,
    counterpart_kind: FundKind,
    counterparts: Vec<Fundable>,
    now: DateTime<Utc>,
) -> Result<Allocation> {
    let mut before = counterparts.clone();
    before.push(source.clone());
    let allocation = allocate_at(source, counterpart_kind, counterparts, now)?;
    check_allocation(&before, &allocation)?;
    Ok(allocation)
}

// ── In-memory ledger ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Rows {
    rows: BTreeMap<(FundKind, i64), Fundable>,
    next_project_id: i64,
    next_donation_id: i64,
}

impl Rows {
    fn next_id(&mut self, kind: FundKind) -> i64 {
        let counter = match kind {
            FundKind::CharityProject => &mut self.next_project_id,
            FundKind::Donation => &mut self.next_donation_id,
        };
        *counter += 1;
        *counter
    }

    fn open(&self, kind: FundKind) -> Vec<Fundable> {
        let mut open: Vec<Fundable> = self
            .rows
            .values()
            .filter(|f| f.kind == kind && f.is_open())
            .cloned()
            .collect();
        open.sort_by(|a, b| (a.create_date, a.id).cmp(&(b.create_date, b.id)));
        open
    }

    fn commit(&mut self, mutated: &[Fundable]) -> Result<()> {
        for entity in mutated {
            let stored = self.rows.get(&entity.key()).ok_or(LedgerError::NotFound {
                kind: entity.kind,
                id: entity.id,
            })?;
            if stored.version != entity.version {
                return Err(LedgerError::ConcurrentModification {
                    kind: entity.kind,
                    id: entity.id,
                });
            }
        }
        for entity in mutated {
            let mut row = entity.clone();
            row.version += 1;
            self.rows.insert(row.key(), row);
        }
        Ok(())
    }
}

/// Thread-safe in-memory ledger.
///
/// [`MemoryLedger::create`] holds the ledger lock from insert to commit, so
/// runs issued through it are serialised. Runs driven through
/// [`run_allocation`] rely on the version check instead.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: Mutex<Rows>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Rows> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an untouched entity without allocating it.
    pub fn insert(&self, kind: FundKind, full_amount: i64, create_date: DateTime<Utc>) -> Result<Fundable> {
        if full_amount <= 0 {
            return Err(LedgerError::InvalidAmount {
                kind,
                amount: full_amount,
            });
        }
        let mut rows = self.lock();
        let entity = Fundable::new(rows.next_id(kind), kind, full_amount, create_date);
        rows.rows.insert(entity.key(), entity.clone());
        debug!(%kind, id = entity.id, full_amount, "inserted");
        Ok(entity)
    }

    /// Insert a new entity and allocate it against the opposite kind in one
    /// critical section.
    ///
    /// A non-positive `full_amount` is rejected before anything is stored.
    pub fn create(&self, kind: FundKind, full_amount: i64, create_date: DateTime<Utc>) -> Result<Allocation> {
        if full_amount <= 0 {
            return Err(LedgerError::InvalidAmount {
                kind,
                amount: full_amount,
            });
        }
        let mut rows = self.lock();
        let source = Fundable::new(rows.next_id(kind), kind, full_amount, create_date);
        let counterpart_kind = kind.counterpart();
        let counterparts = rows.open(counterpart_kind);

        let allocation = allocate_guarded(source.clone(), counterpart_kind, counterparts, Utc::now())?;

        rows.rows.insert(source.key(), source);
        rows.commit(&allocation.mutated())?;
        info!(
            %kind,
            id = allocation.source.id,
            transferred = allocation.total_transferred(),
            counterparts = allocation.touched.len(),
            "allocation committed"
        );
        Ok(allocation)
    }

    pub fn get(&self, kind: FundKind, id: i64) -> Option<Fundable> {
        self.lock().rows.get(&(kind, id)).cloned()
    }

    /// Every stored entity, projects first, each kind by id.
    pub fn snapshot(&self) -> Vec<Fundable> {
        self.lock().rows.values().cloned().collect()
    }
}

impl LedgerStore for MemoryLedger {
    fn fetch_open(&self, kind: FundKind) -> Result<Vec<Fundable>> {
        Ok(self.lock().open(kind))
    }

    fn commit(&self, mutated: &[Fundable]) -> Result<()> {
        self.lock().commit(mutated)
    }
}
