use axum::{extract::{Query, State}, Json};
use std::sync::Arc;

use crate::errors::{ApiResponse, AppError};
use crate::models::{AssignReferralRequest, AssignReferralResponse, ReferralStatsResponse, ResolveParams};
use crate::services::{identity, referral};
use crate::AppState;

/// POST `/referrals` — create a referrer/referee link. Two modes: local
/// ids, or `(provider, referrer_external_id, referee_external_id)`; the
/// latter is lookup-only (§4.5) — a missing identity fails with 404, no
/// user is created.
#[utoipa::path(
    post,
    path = "/api/v1/referrals",
    request_body = AssignReferralRequest,
    responses(
        (status = 200, description = "Created, or already existed (created=false)", body = ApiResponse<AssignReferralResponse>),
        (status = 400, description = "Self-referral, missing identifiers, or unresolved external identity (external-id mode is lookup-only)"),
    ),
    security(("bearer_auth" = [])),
    tag = "Referral"
)]
pub async fn create_referral(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AssignReferralRequest>,
) -> Result<Json<ApiResponse<AssignReferralResponse>>, AppError> {
    let provider = body.provider.as_deref().unwrap_or(identity::DEFAULT_PROVIDER);

    let referrer_id = match body.referrer_user_id {
        Some(id) => id,
        None => {
            let external_id = body.referrer_external_id.as_deref().ok_or_else(|| {
                AppError::Validation("referrer_user_id or referrer_external_id is required".to_string())
            })?;
            identity::resolve_read_only(&state.db.pool, provider, external_id)
                .await?
                .ok_or_else(|| AppError::Validation(format!("identity {provider}/{external_id} not found")))?
        }
    };

    let referee_id = match body.referee_user_id {
        Some(id) => id,
        None => {
            let external_id = body.referee_external_id.as_deref().ok_or_else(|| {
                AppError::Validation("referee_user_id or referee_external_id is required".to_string())
            })?;
            identity::resolve_read_only(&state.db.pool, provider, external_id)
                .await?
                .ok_or_else(|| AppError::Validation(format!("identity {provider}/{external_id} not found")))?
        }
    };

    let outcome = referral::assign(&state.db.pool, &state.bus, referrer_id, referee_id, body.metadata.clone()).await?;

    Ok(Json(ApiResponse::ok(
        "referral assigned",
        AssignReferralResponse {
            referral_id: outcome.referral.id,
            created: outcome.created,
        },
    )))
}

/// GET `/referrals/stats` — number of referees for a resolved referrer.
#[utoipa::path(
    get,
    path = "/api/v1/referrals/stats",
    params(
        ("user_id" = Option<uuid::Uuid>, Query),
        ("external_id" = Option<String>, Query),
        ("provider" = Option<String>, Query),
    ),
    responses(
        (status = 200, description = "Referee count", body = ApiResponse<ReferralStatsResponse>),
        (status = 404, description = "Identity not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Referral"
)]
pub async fn referral_stats(
    State(state): State<Arc<AppState>>,
    Query(resolve): Query<ResolveParams>,
) -> Result<Json<ApiResponse<ReferralStatsResponse>>, AppError> {
    let referrer_id = identity::resolve_read_params(&state.db.pool, &resolve)
        .await?
        .ok_or_else(|| AppError::NotFound("identity not found".to_string()))?;
    let referee_count = referral::referee_count(&state.db.pool, referrer_id).await?;
    Ok(Json(ApiResponse::ok(
        "referral stats",
        ReferralStatsResponse { referee_count },
    )))
}
