//! Database layer: migrations, CRUD queries, and the ledger store used by
//! allocation runs.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fund_ledger::{FundKind, Fundable, LedgerError};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqliteConnection, SqliteExecutor, SqlitePool,
};
use tracing::{debug, info};

use crate::errors::{Result, ServiceError};
use crate::models::{DonationCreate, DonationRecord, FundingRow, ProjectCreate, ProjectRecord};
use crate::validators::DUPLICATE_NAME;

const PROJECT_COLUMNS: &str = "id, name, description, full_amount, invested_amount, \
     fully_invested, create_date, close_date, version";
const DONATION_COLUMNS: &str = "id, full_amount, comment, user_id, invested_amount, \
     fully_invested, create_date, close_date, version";
const FUNDING_COLUMNS: &str =
    "id, full_amount, invested_amount, fully_invested, create_date, close_date, version";

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    // Make sure the file is created if it doesn't exist yet.
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    // An in-memory database only lives as long as its single connection.
    let pool = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

fn table(kind: FundKind) -> &'static str {
    match kind {
        FundKind::CharityProject => "charity_project",
        FundKind::Donation => "donation",
    }
}

fn name_conflict(err: sqlx::Error) -> ServiceError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ServiceError::Conflict(DUPLICATE_NAME.to_string())
        }
        _ => ServiceError::Database(err),
    }
}

// ─────────────────────────────────────────────────────────
// Ledger store
// ─────────────────────────────────────────────────────────

/// Open entities of `kind`, oldest `create_date` first, ties by id.
pub async fn fetch_open<'e, E>(executor: E, kind: FundKind) -> Result<Vec<Fundable>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "SELECT {FUNDING_COLUMNS} FROM {} WHERE fully_invested = 0 \
         ORDER BY create_date ASC, id ASC",
        table(kind)
    );
    let rows = sqlx::query_as::<_, FundingRow>(&sql)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(|r| r.into_fundable(kind)).collect())
}

/// Write the funding columns of every mutated entity.
///
/// Each row is updated only if it still carries the version it was read
/// with; otherwise [`LedgerError::ConcurrentModification`] is returned and the
/// caller must drop the surrounding transaction.
pub async fn apply_mutations(conn: &mut SqliteConnection, mutated: &[Fundable]) -> Result<()> {
    for entity in mutated {
        let sql = format!(
            "UPDATE {} SET invested_amount = ?1, fully_invested = ?2, close_date = ?3, \
             version = version + 1 WHERE id = ?4 AND version = ?5",
            table(entity.kind)
        );
        let rows_affected = sqlx::query(&sql)
            .bind(entity.invested_amount)
            .bind(entity.fully_invested)
            .bind(entity.close_date)
            .bind(entity.id)
            .bind(entity.version)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(LedgerError::ConcurrentModification {
                kind: entity.kind,
                id: entity.id,
            }
            .into());
        }
        debug!(kind = %entity.kind, id = entity.id, invested = entity.invested_amount, "row updated");
    }
    Ok(())
}

/// Funding state of every project and donation.
pub async fn ledger_funding(pool: &SqlitePool) -> Result<Vec<Fundable>> {
    let mut all = Vec::new();
    for kind in [FundKind::CharityProject, FundKind::Donation] {
        let sql = format!("SELECT {FUNDING_COLUMNS} FROM {} ORDER BY id ASC", table(kind));
        let rows = sqlx::query_as::<_, FundingRow>(&sql).fetch_all(pool).await?;
        all.extend(rows.into_iter().map(|r| r.into_fundable(kind)));
    }
    Ok(all)
}

// ─────────────────────────────────────────────────────────
// Charity projects
// ─────────────────────────────────────────────────────────

pub async fn list_projects(pool: &SqlitePool) -> Result<Vec<ProjectRecord>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM charity_project ORDER BY id ASC");
    let rows = sqlx::query_as::<_, ProjectRecord>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

pub async fn get_project<'e, E>(executor: E, id: i64) -> Result<Option<ProjectRecord>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM charity_project WHERE id = ?1");
    let row = sqlx::query_as::<_, ProjectRecord>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row)
}

pub async fn find_project_id_by_name(pool: &SqlitePool, name: &str) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM charity_project WHERE name = ?1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(id,)| id))
}

/// Insert an untouched project. The caller runs allocation in the same
/// transaction.
pub async fn insert_project<'e, E>(
    executor: E,
    input: &ProjectCreate,
    now: DateTime<Utc>,
) -> Result<ProjectRecord>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "INSERT INTO charity_project (name, description, full_amount, create_date) \
         VALUES (?1, ?2, ?3, ?4) RETURNING {PROJECT_COLUMNS}"
    );
    sqlx::query_as::<_, ProjectRecord>(&sql)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.full_amount)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(name_conflict)
}

/// Update the descriptive fields of an open project.
///
/// Returns `None` if the project vanished or was closed in the meantime.
pub async fn update_project_text(
    pool: &SqlitePool,
    id: i64,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Option<ProjectRecord>> {
    let sql = format!(
        "UPDATE charity_project SET name = COALESCE(?1, name), \
         description = COALESCE(?2, description) \
         WHERE id = ?3 AND fully_invested = 0 RETURNING {PROJECT_COLUMNS}"
    );
    sqlx::query_as::<_, ProjectRecord>(&sql)
        .bind(name)
        .bind(description)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(name_conflict)
}

/// Delete a project that never received money.
///
/// Returns `None` if no such uninvested project exists.
pub async fn delete_project(pool: &SqlitePool, id: i64) -> Result<Option<ProjectRecord>> {
    let sql = format!(
        "DELETE FROM charity_project WHERE id = ?1 AND invested_amount = 0 \
         RETURNING {PROJECT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, ProjectRecord>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Donations
// ─────────────────────────────────────────────────────────

pub async fn list_donations(pool: &SqlitePool) -> Result<Vec<DonationRecord>> {
    let sql = format!("SELECT {DONATION_COLUMNS} FROM donation ORDER BY id ASC");
    let rows = sqlx::query_as::<_, DonationRecord>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

pub async fn list_user_donations(pool: &SqlitePool, user_id: i64) -> Result<Vec<DonationRecord>> {
    let sql = format!("SELECT {DONATION_COLUMNS} FROM donation WHERE user_id = ?1 ORDER BY id ASC");
    let rows = sqlx::query_as::<_, DonationRecord>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn get_donation<'e, E>(executor: E, id: i64) -> Result<Option<DonationRecord>>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("SELECT {DONATION_COLUMNS} FROM donation WHERE id = ?1");
    let row = sqlx::query_as::<_, DonationRecord>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row)
}

/// Insert an untouched donation. The caller runs allocation in the same
/// transaction.
pub async fn insert_donation<'e, E>(
    executor: E,
    input: &DonationCreate,
    now: DateTime<Utc>,
) -> Result<DonationRecord>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!(
        "INSERT INTO donation (full_amount, comment, user_id, create_date) \
         VALUES (?1, ?2, ?3, ?4) RETURNING {DONATION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, DonationRecord>(&sql)
        .bind(input.full_amount)
        .bind(&input.comment)
        .bind(input.user_id)
        .bind(now)
        .fetch_one(executor)
        .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
