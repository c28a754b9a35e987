//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use fund_ledger::{invariants::check_ledger, LedgerTotals};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::allocator::Allocator;
use crate::db;
use crate::errors::{Result, ServiceError};
use crate::models::{DonationCreate, DonationRecord, ProjectCreate, ProjectRecord, ProjectUpdate};
use crate::validators;

pub struct ApiState {
    pub pool: SqlitePool,
    pub allocator: Allocator,
    pub title: String,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ledger/balance", get(ledger_balance))
        .route("/charity_project/", get(list_projects).post(create_project))
        .route("/charity_project/:id", patch(update_project).delete(delete_project))
        .route("/donation/", get(list_donations).post(create_donation))
        .route("/users/:user_id/donations", get(list_user_donations))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub title: String,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub balanced: bool,
    #[serde(flatten)]
    pub totals: LedgerTotals,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        title: state.title.clone(),
    })
}

/// `GET /ledger/balance`
///
/// Runs the consistency guard over the whole ledger.
pub async fn ledger_balance(State(state): State<Arc<ApiState>>) -> Result<Json<BalanceResponse>> {
    let funding = db::ledger_funding(&state.pool).await?;
    let totals = check_ledger(&funding)?;
    Ok(Json(BalanceResponse {
        balanced: totals.is_balanced(),
        totals,
    }))
}

/// `GET /charity_project/`
pub async fn list_projects(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<ProjectRecord>>> {
    Ok(Json(db::list_projects(&state.pool).await?))
}

/// `POST /charity_project/`
///
/// Creates the project and immediately invests any open donations into it.
pub async fn create_project(
    State(state): State<Arc<ApiState>>,
    Json(input): Json<ProjectCreate>,
) -> Result<Json<ProjectRecord>> {
    validators::check_name_duplicate(&state.pool, &input.name, None).await?;
    Ok(Json(state.allocator.create_project(&input).await?))
}

/// `PATCH /charity_project/:id`
pub async fn update_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    Json(update): Json<ProjectUpdate>,
) -> Result<Json<ProjectRecord>> {
    validators::check_project_before_edit(&state.pool, id, &update).await?;
    let updated = db::update_project_text(
        &state.pool,
        id,
        update.name.as_deref(),
        update.description.as_deref(),
    )
    .await?;
    match updated {
        Some(record) => Ok(Json(record)),
        None => Err(unmatched_project(&state.pool, id, validators::CLOSED_PROJECT).await),
    }
}

/// `DELETE /charity_project/:id`
pub async fn delete_project(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Result<Json<ProjectRecord>> {
    validators::check_project_before_delete(&state.pool, id).await?;
    match db::delete_project(&state.pool, id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(unmatched_project(&state.pool, id, validators::INVESTED_PROJECT).await),
    }
}

/// Error for a guarded project write that matched no row: the project is
/// either gone or no longer in the required state.
async fn unmatched_project(pool: &SqlitePool, id: i64, conflict: &str) -> ServiceError {
    match db::get_project(pool, id).await {
        Ok(Some(_)) => ServiceError::Conflict(conflict.to_string()),
        Ok(None) => ServiceError::NotFound(validators::PROJECT_NOT_FOUND.to_string()),
        Err(err) => err,
    }
}

/// `GET /donation/`
pub async fn list_donations(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<DonationRecord>>> {
    Ok(Json(db::list_donations(&state.pool).await?))
}

/// `POST /donation/`
///
/// Records the donation and immediately invests it into open projects.
pub async fn create_donation(
    State(state): State<Arc<ApiState>>,
    Json(input): Json<DonationCreate>,
) -> Result<Json<DonationRecord>> {
    Ok(Json(state.allocator.create_donation(&input).await?))
}

/// `GET /users/:user_id/donations`
pub async fn list_user_donations(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<DonationRecord>>> {
    Ok(Json(db::list_user_donations(&state.pool, user_id).await?))
}
