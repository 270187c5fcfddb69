use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    models::{
        common::SuccessResponse,
        credits::{
            CreditAdjustmentData, CreditAdjustmentRequest, CreditHistoryData, CreditHistoryQuery,
            CreditScope, CreditTransactionRecord,
        },
        credits_panel::CreditsPanel,
        owner::Owner,
    },
};

/// GET /admin/users/{user_id}/tools/credits
#[instrument(skip(state))]
pub async fn show_credits_panel(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<SuccessResponse<CreditsPanel>>> {
    require_user(&state, user_id).await?;

    let unspent_credits = state
        .credits_service
        .balance_of(Owner::User(user_id))
        .await?;
    let organization = state.organization_service.context_for(user_id).await?;

    Ok(Json(SuccessResponse::new(CreditsPanel::build(
        user_id,
        unspent_credits,
        organization,
    ))))
}

/// POST /admin/users/{user_id}/tools/credits
#[instrument(skip(state, request))]
pub async fn adjust_credits(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<CreditAdjustmentRequest>,
) -> Result<Json<SuccessResponse<CreditAdjustmentData>>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    require_user(&state, user_id).await?;
    let owner = resolve_owner(&state, user_id, request.scope).await?;

    let receipt = state
        .credits_service
        .apply_operation(
            owner,
            request.operation,
            request.amount,
            request.reason.as_deref(),
        )
        .await?;

    Ok(Json(SuccessResponse::new(CreditAdjustmentData {
        transaction_id: receipt.transaction_id,
        owner,
        operation: request.operation,
        amount: request.amount,
        unspent_credits: receipt.unspent_credits,
    })))
}

/// GET /admin/users/{user_id}/tools/credits/transactions?scope=user|organization
#[instrument(skip(state))]
pub async fn list_credit_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<CreditHistoryQuery>,
) -> Result<Json<SuccessResponse<CreditHistoryData>>> {
    require_user(&state, user_id).await?;
    let owner = resolve_owner(&state, user_id, query.scope).await?;

    let snapshot = state.credits_service.snapshot(owner).await?;
    let transactions = state.credits_service.history(owner).await?;

    Ok(Json(SuccessResponse::new(CreditHistoryData {
        owner,
        unspent_credits: snapshot.unspent_credits,
        transactions: transactions
            .iter()
            .map(CreditTransactionRecord::from)
            .collect(),
    })))
}

async fn require_user(state: &AppState, user_id: Uuid) -> Result<()> {
    state
        .directory_service
        .find_user(user_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", user_id)))
}

async fn resolve_owner(state: &AppState, user_id: Uuid, scope: CreditScope) -> Result<Owner> {
    match scope {
        CreditScope::User => Ok(Owner::User(user_id)),
        CreditScope::Organization => Ok(state
            .organization_service
            .organization_of(user_id)
            .await?),
    }
}
