use axum::{extract::State, Json};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::api::handlers::trial::TRIAL_IDENTITY_TYPE;
use crate::errors::{ApiResponse, AppError};
use crate::models::{IdentifyRequest, IdentifyResponse};
use crate::services::identity;
use crate::AppState;

/// POST `/identify` — write-path identity resolve (§6).
#[utoipa::path(
    post,
    path = "/api/v1/identify",
    request_body = IdentifyRequest,
    responses(
        (status = 200, description = "Identity resolved", body = ApiResponse<IdentifyResponse>),
        (status = 400, description = "Empty or whitespace-only external_id"),
    ),
    security(("bearer_auth" = [])),
    tag = "Identity"
)]
pub async fn identify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IdentifyRequest>,
) -> Result<Json<ApiResponse<IdentifyResponse>>, AppError> {
    use validator::Validate;
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let provider = body.provider.clone().unwrap_or_else(|| "default".to_string());
    let resolved = identity::resolve_or_create(
        &state.db.pool,
        &provider,
        &body.external_id,
        body.profile.clone(),
    )
    .await?;

    let identity_hash = hex::encode(Sha256::digest(body.external_id.trim().to_lowercase().as_bytes()));
    let trial_used: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM trial_history WHERE identity_type = $1 AND identity_hash = $2)",
    )
    .bind(TRIAL_IDENTITY_TYPE)
    .bind(&identity_hash)
    .fetch_one(&state.db.pool)
    .await
    .unwrap_or(false);
    let trial_eligible = !trial_used;

    let response = IdentifyResponse {
        user_id: resolved.user_id,
        identity_id: resolved.identity_id,
        provider,
        external_id: body.external_id.trim().to_string(),
        created_identity: resolved.created_identity,
        created_user: resolved.created_user,
        trial_eligible,
        metadata: resolved.metadata,
    };

    Ok(Json(ApiResponse::ok("identity resolved", response)))
}
