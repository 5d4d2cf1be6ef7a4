use axum::{extract::State, Json};
use std::sync::Arc;

use crate::errors::{ApiResponse, AppError};
use crate::models::{ActiveBatchResponse, ResolveParams, TrialGrantRequest};
use crate::services::{catalog, identity, referral};
use crate::AppState;

/// The identity dimension trial reuse is keyed on. The reference
/// implementation hashes the resolved external id rather than the local
/// user id, so a banned/reused identity can't work around the check by
/// re-identifying under a fresh local user.
pub const TRIAL_IDENTITY_TYPE: &str = "external_id";

/// POST `/demo/trial-grant` — reference trial grant (§4.5), gated on hashed
/// identity via `TrialHistory`.
#[utoipa::path(
    post,
    path = "/api/v1/demo/trial-grant",
    request_body = TrialGrantRequest,
    responses(
        (status = 200, description = "Trial activated", body = ApiResponse<Vec<ActiveBatchResponse>>),
        (status = 400, description = "trial_already_used for this identity"),
        (status = 404, description = "Trial offer not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Referral"
)]
pub async fn grant_trial(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TrialGrantRequest>,
) -> Result<Json<ApiResponse<Vec<ActiveBatchResponse>>>, AppError> {
    let resolve = ResolveParams {
        user_id: body.user_id,
        external_id: body.external_id.clone(),
        provider: body.provider.clone(),
    };
    let user_id = identity::resolve_write_params(&state.db.pool, &resolve)
        .await?
        .ok_or_else(|| AppError::Validation("user_id or external_id is required".to_string()))?;

    let identity_value = body
        .external_id
        .clone()
        .ok_or_else(|| AppError::Validation("external_id is required for trial reuse checking".to_string()))?;

    let offer = catalog::get_offer_by_sku(&state.db.pool, &body.sku)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("offer {} not found", body.sku)))?;
    let offer_items = catalog::get_offer_items(&state.db.pool, offer.id).await?;

    referral::grant_trial(
        &state.db.pool,
        &state.bus,
        user_id,
        TRIAL_IDENTITY_TYPE,
        &identity_value,
        &offer,
        &offer_items,
    )
    .await?;

    let batches = crate::services::ledger::list_active_batches(&state.db.pool, user_id, None).await?;
    let response = batches
        .into_iter()
        .map(|b| ActiveBatchResponse {
            id: b.id,
            product_key: b.product_key,
            initial_quantity: b.initial_quantity,
            remaining_quantity: b.remaining_quantity,
            valid_from: b.valid_from,
            expires_at: b.expires_at,
            state: b.state,
        })
        .collect();

    Ok(Json(ApiResponse::ok("trial activated", response)))
}
