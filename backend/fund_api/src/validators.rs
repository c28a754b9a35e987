//! Request checks run before anything touches the ledger.

use fund_ledger::{FundKind, LedgerError};
use sqlx::SqlitePool;

use crate::db;
use crate::errors::{Result, ServiceError};
use crate::models::{DonationCreate, ProjectCreate, ProjectRecord, ProjectUpdate, NAME_MAX_LEN};

pub const DUPLICATE_NAME: &str = "a project with this name already exists";
pub const PROJECT_NOT_FOUND: &str = "project not found";
pub const CLOSED_PROJECT: &str = "a closed project cannot be edited";
pub const INVESTED_PROJECT: &str = "funds were invested in this project; it cannot be deleted";

fn check_amount(kind: FundKind, amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount { kind, amount }.into());
    }
    Ok(())
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ServiceError::Validation("name must not be empty".to_string()));
    }
    if name.chars().count() > NAME_MAX_LEN {
        return Err(ServiceError::Validation(format!(
            "name must be at most {NAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn check_description(description: &str) -> Result<()> {
    if description.trim().is_empty() {
        return Err(ServiceError::Validation(
            "description must not be empty".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_project_create(input: &ProjectCreate) -> Result<()> {
    check_name(&input.name)?;
    check_description(&input.description)?;
    check_amount(FundKind::CharityProject, input.full_amount)
}

pub fn validate_donation_create(input: &DonationCreate) -> Result<()> {
    check_amount(FundKind::Donation, input.full_amount)
}

/// Reject `name` if another project already uses it.
pub async fn check_name_duplicate(pool: &SqlitePool, name: &str, except: Option<i64>) -> Result<()> {
    match db::find_project_id_by_name(pool, name).await? {
        Some(id) if Some(id) != except => Err(ServiceError::Conflict(DUPLICATE_NAME.to_string())),
        _ => Ok(()),
    }
}

pub async fn check_project_exists(pool: &SqlitePool, id: i64) -> Result<ProjectRecord> {
    db::get_project(pool, id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(PROJECT_NOT_FOUND.to_string()))
}

pub async fn check_project_before_edit(
    pool: &SqlitePool,
    id: i64,
    update: &ProjectUpdate,
) -> Result<ProjectRecord> {
    let project = check_project_exists(pool, id).await?;
    if project.fully_invested {
        return Err(ServiceError::Conflict(CLOSED_PROJECT.to_string()));
    }
    if update.is_empty() {
        return Err(ServiceError::Validation(
            "no new data supplied".to_string(),
        ));
    }
    if update.full_amount.is_some() {
        return Err(ServiceError::Validation(
            "full_amount cannot be changed after creation".to_string(),
        ));
    }
    if let Some(name) = &update.name {
        check_name(name)?;
        check_name_duplicate(pool, name, Some(id)).await?;
    }
    if let Some(description) = &update.description {
        check_description(description)?;
    }
    Ok(project)
}

pub async fn check_project_before_delete(pool: &SqlitePool, id: i64) -> Result<ProjectRecord> {
    let project = check_project_exists(pool, id).await?;
    if project.invested_amount != 0 {
        return Err(ServiceError::Conflict(INVESTED_PROJECT.to_string()));
    }
    Ok(project)
}
