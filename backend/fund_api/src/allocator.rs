//! Create-and-allocate runs against the SQLite ledger.
//!
//! A new project or donation is inserted and allocated against the open
//! entities of the other kind inside one transaction. Runs are serialised by
//! an async mutex; the per-row version check in [`db::apply_mutations`]
//! catches any write that slipped past it, in which case the whole run is
//! rolled back and retried from a fresh fetch.

use std::future::Future;

use chrono::Utc;
use fund_ledger::{allocate, invariants::check_allocation, Allocation, Fundable, LedgerError};
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::db;
use crate::errors::{Result, ServiceError};
use crate::models::{DonationCreate, DonationRecord, ProjectCreate, ProjectRecord};
use crate::validators::{validate_donation_create, validate_project_create};

pub struct Allocator {
    pool: SqlitePool,
    gate: Mutex<()>,
    max_attempts: u32,
}

enum Pending<'a> {
    Project(&'a ProjectCreate),
    Donation(&'a DonationCreate),
}

impl Allocator {
    pub fn new(pool: SqlitePool, max_attempts: u32) -> Self {
        Self {
            pool,
            gate: Mutex::new(()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Create a project and invest open donations into it.
    pub async fn create_project(&self, input: &ProjectCreate) -> Result<ProjectRecord> {
        validate_project_create(input)?;
        let id = self.create(Pending::Project(input)).await?;
        db::get_project(&self.pool, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("project {id} vanished after commit")))
    }

    /// Create a donation and invest it into open projects.
    pub async fn create_donation(&self, input: &DonationCreate) -> Result<DonationRecord> {
        validate_donation_create(input)?;
        let id = self.create(Pending::Donation(input)).await?;
        db::get_donation(&self.pool, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("donation {id} vanished after commit")))
    }

    async fn create(&self, pending: Pending<'_>) -> Result<i64> {
        let _gate = self.gate.lock().await;
        let pending = &pending;
        retry_on_conflict(self.max_attempts, move || self.try_create(pending)).await
    }

    async fn try_create(&self, pending: &Pending<'_>) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let source = match pending {
            Pending::Project(input) => db::insert_project(&mut *tx, input, now).await?.fundable(),
            Pending::Donation(input) => db::insert_donation(&mut *tx, input, now).await?.fundable(),
        };
        let allocation = allocate_in(&mut tx, source).await?;
        tx.commit().await?;

        info!(
            "{} {} allocated: {} transferred across {} counterparts, closed={}",
            allocation.source.kind,
            allocation.source.id,
            allocation.total_transferred(),
            allocation.touched.len(),
            allocation.source.fully_invested
        );
        Ok(allocation.source.id)
    }
}

/// Run `attempt` until it stops failing with
/// [`LedgerError::ConcurrentModification`], at most `max_attempts` times.
///
/// Each attempt must start from a fresh read; any other outcome is returned
/// as is.
async fn retry_on_conflict<T, F, Fut>(max_attempts: u32, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Err(ServiceError::Ledger(LedgerError::ConcurrentModification { kind, id })) => {
                if tries >= max_attempts {
                    return Err(ServiceError::RetriesExhausted { attempts: tries });
                }
                warn!("{kind} {id} changed during allocation, retrying (attempt {tries})");
            }
            other => return other,
        }
    }
}

/// Allocate `source` against the open counterparts visible on `conn` and
/// write the mutated set. Does not commit.
pub async fn allocate_in(conn: &mut SqliteConnection, source: Fundable) -> Result<Allocation> {
    let counterpart_kind = source.kind.counterpart();
    let counterparts = db::fetch_open(&mut *conn, counterpart_kind).await?;

    let mut before = counterparts.clone();
    before.push(source.clone());
    let allocation = allocate(source, counterpart_kind, counterparts)?;
    check_allocation(&before, &allocation)?;

    db::apply_mutations(conn, &allocation.mutated()).await?;
    Ok(allocation)
}
