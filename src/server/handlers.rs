use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::principal::OptionalPrincipal;
use super::response::ApiResponse;
use super::AppState;
use crate::error::AccessError;
use crate::events::BudgetStatus;
use crate::guard::{authorize_ownership, HouseholdAccess};
use crate::household::{is_valid_budget_limit, Household, HouseholdRole, Member, RequiredRole};
use crate::notifier::NotifyOutcome;
use crate::store::{Alert, Expense};

type ApiResult<T> = Result<T, AccessError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHouseholdRequest {
    pub name: String,
    #[serde(default)]
    pub budget_limit: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinHouseholdRequest {
    pub invite_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBudgetLimitRequest {
    pub budget_limit: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordExpenseRequest {
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    pub spent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseResponse {
    pub expense: Expense,
    pub status: BudgetStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCheckResponse {
    pub status: BudgetStatus,
    pub alerts_raised: usize,
    pub delivered: usize,
}

fn store_error(e: anyhow::Error) -> AccessError {
    AccessError::Store(e)
}

fn require_signed_in(principal: &OptionalPrincipal) -> ApiResult<&crate::household::Principal> {
    principal
        .as_ref()
        .filter(|p| !p.normalized_id().is_empty())
        .ok_or_else(AccessError::missing_principal)
}

/// Current-month status for an authorized household.
async fn current_status(state: &AppState, household: &Household) -> ApiResult<BudgetStatus> {
    let spent = state
        .store
        .spent_in_month(&household.id, Utc::now())
        .await
        .map_err(store_error)?;
    Ok(BudgetStatus::compute(spent, household.budget_limit))
}

/// Push the warning and persist one alert per member when over budget.
/// Neither failure fails the caller's request. Returns the alerts stored.
async fn raise_budget_alerts(state: &AppState, household: &Household, status: &BudgetStatus) -> (usize, NotifyOutcome) {
    let outcome = state.notifier.notify(&household.id, status);
    if !status.over_budget {
        return (0, outcome);
    }

    let alerts = Alert::for_members(household, status, Utc::now());
    match state.store.record_alerts(&alerts).await {
        Ok(()) => (alerts.len(), outcome),
        Err(e) => {
            warn!(household_id = %household.id, error = %e, "Budget alerts not stored");
            (0, outcome)
        }
    }
}

// ============================================================================
// HOUSEHOLDS
// ============================================================================

/// GET /api/health - Health check
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(serde_json::json!({
        "status": "OK",
        "connections": state.channels.connection_count(),
    })))
}

/// POST /api/households/create - Create a household owned by the caller
pub async fn create_household(
    State(state): State<AppState>,
    principal: OptionalPrincipal,
    Json(request): Json<CreateHouseholdRequest>,
) -> ApiResult<impl IntoResponse> {
    let principal = require_signed_in(&principal)?;

    let name = request.name.trim();
    if name.is_empty() {
        return Err(AccessError::BadRequest("household name is required".to_string()));
    }
    if !is_valid_budget_limit(request.budget_limit) {
        return Err(AccessError::BadRequest("budget limit must be a non-negative number".to_string()));
    }

    let household = Household::create(name, principal.normalized_id(), request.budget_limit)
        .map_err(|e| AccessError::BadRequest(e.to_string()))?;
    state
        .store
        .insert_household(&household)
        .await
        .map_err(store_error)?;

    info!(household_id = %household.id, owner = %principal.id, "Household created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(household))))
}

/// POST /api/households/join - Join a household by invite code as MEMBER
pub async fn join_household(
    State(state): State<AppState>,
    principal: OptionalPrincipal,
    Json(request): Json<JoinHouseholdRequest>,
) -> ApiResult<impl IntoResponse> {
    let principal = require_signed_in(&principal)?;

    if request.invite_code.trim().is_empty() {
        return Err(AccessError::BadRequest("invite code is required".to_string()));
    }

    let mut household = state
        .store
        .find_by_invite_code(&request.invite_code)
        .await
        .map_err(store_error)?
        .ok_or_else(|| AccessError::BadRequest("invalid invite code".to_string()))?;

    let member: Member = household
        .add_member(principal.normalized_id(), HouseholdRole::Member)
        .map_err(|e| AccessError::BadRequest(e.to_string()))?
        .clone();
    state
        .store
        .insert_member(&household.id, &member)
        .await
        .map_err(store_error)?;

    info!(household_id = %household.id, user_id = %principal.id, "Member joined household");
    Ok(Json(ApiResponse::ok(household)))
}

/// GET /api/households - Households the caller belongs to
pub async fn list_households(
    State(state): State<AppState>,
    principal: OptionalPrincipal,
) -> ApiResult<impl IntoResponse> {
    let principal = require_signed_in(&principal)?;
    let households = state
        .store
        .list_for_user(principal.normalized_id())
        .await
        .map_err(store_error)?;
    Ok(Json(ApiResponse::ok(households)))
}

/// GET /api/households/:household_id - VIEWER or higher
pub async fn get_household(
    State(state): State<AppState>,
    principal: OptionalPrincipal,
    Path(household_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let access = state
        .guard
        .authorize(principal.as_ref(), &household_id, RequiredRole::Viewer)
        .await?;
    Ok(Json(ApiResponse::ok(access.household)))
}

// ============================================================================
// BUDGET
// ============================================================================

/// GET /api/budget/status/:household_id - VIEWER or higher
pub async fn get_budget_status(
    State(state): State<AppState>,
    principal: OptionalPrincipal,
    Path(household_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let access = state
        .guard
        .authorize(principal.as_ref(), &household_id, RequiredRole::Viewer)
        .await?;
    let status = current_status(&state, &access.household).await?;
    Ok(Json(ApiResponse::ok(status)))
}

/// PUT /api/budget/limit/:household_id - OWNER only
pub async fn update_budget_limit(
    State(state): State<AppState>,
    principal: OptionalPrincipal,
    Path(household_id): Path<String>,
    Json(request): Json<UpdateBudgetLimitRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut access: HouseholdAccess = state
        .guard
        .authorize(principal.as_ref(), &household_id, RequiredRole::Owner)
        .await?;

    if !is_valid_budget_limit(request.budget_limit) {
        return Err(AccessError::BadRequest("budget limit must be a non-negative number".to_string()));
    }

    state
        .store
        .set_budget_limit(access.household_id(), request.budget_limit)
        .await
        .map_err(store_error)?;
    access.household.budget_limit = request.budget_limit;

    let status = current_status(&state, &access.household).await?;
    raise_budget_alerts(&state, &access.household, &status).await;

    info!(household_id = %access.household.id, budget_limit = request.budget_limit, "Budget limit updated");
    Ok(Json(ApiResponse::ok(status)))
}

/// POST /api/budget/expenses/:household_id - MEMBER or higher
pub async fn record_expense(
    State(state): State<AppState>,
    principal: OptionalPrincipal,
    Path(household_id): Path<String>,
    Json(request): Json<RecordExpenseRequest>,
) -> ApiResult<impl IntoResponse> {
    let access = state
        .guard
        .authorize(principal.as_ref(), &household_id, RequiredRole::Member)
        .await?;

    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(AccessError::BadRequest("amount must be a positive number".to_string()));
    }

    let expense = Expense::new(
        access.household_id(),
        &access.member.user_id,
        request.amount,
        request.description,
        request.spent_at.unwrap_or_else(Utc::now),
    );
    state
        .store
        .record_expense(&expense)
        .await
        .map_err(store_error)?;

    let status = current_status(&state, &access.household).await?;
    raise_budget_alerts(&state, &access.household, &status).await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(ExpenseResponse { expense, status })),
    ))
}

// ============================================================================
// ALERTS
// ============================================================================

/// GET /api/alerts - The caller's budget alerts, newest first
pub async fn list_alerts(
    State(state): State<AppState>,
    principal: OptionalPrincipal,
) -> ApiResult<impl IntoResponse> {
    let principal = require_signed_in(&principal)?;
    let alerts = state
        .store
        .list_alerts_for_user(principal.normalized_id())
        .await
        .map_err(store_error)?;
    Ok(Json(ApiResponse::ok(alerts)))
}

/// PUT /api/alerts/:alert_id/read - Only the alert's recipient
pub async fn mark_alert_read(
    State(state): State<AppState>,
    principal: OptionalPrincipal,
    Path(alert_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let principal = require_signed_in(&principal)?;

    let mut alert = state
        .store
        .find_alert(alert_id.trim())
        .await
        .map_err(store_error)?
        .ok_or_else(|| AccessError::NotFound("alert not found".to_string()))?;
    authorize_ownership(Some(principal), &alert.user_id)?;

    state
        .store
        .mark_alert_read(&alert.id)
        .await
        .map_err(store_error)?;
    alert.read = true;
    Ok(Json(ApiResponse::ok(alert)))
}

/// POST /api/alerts/check/:household_id - MEMBER or higher, re-run the threshold check
pub async fn check_budget(
    State(state): State<AppState>,
    principal: OptionalPrincipal,
    Path(household_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let access = state
        .guard
        .authorize(principal.as_ref(), &household_id, RequiredRole::Member)
        .await?;

    let status = current_status(&state, &access.household).await?;
    let (alerts_raised, outcome) = raise_budget_alerts(&state, &access.household, &status).await;
    let delivered = match outcome {
        NotifyOutcome::Broadcast { delivered } => delivered,
        NotifyOutcome::Skipped | NotifyOutcome::Failed => 0,
    };

    info!(household_id = %access.household.id, over_budget = status.over_budget, alerts_raised, "Budget check");
    Ok(Json(ApiResponse::ok(BudgetCheckResponse {
        status,
        alerts_raised,
        delivered,
    })))
}
