use axum::{extract::State, Json};
use std::sync::Arc;

use crate::errors::{ApiResponse, AppError};
use crate::models::{MergeCustomersRequest, MergeCustomersResponse};
use crate::services::customer;
use crate::AppState;

/// POST `/customers/merge` — moves all data `source -> target` (§9).
#[utoipa::path(
    post,
    path = "/api/v1/customers/merge",
    request_body = MergeCustomersRequest,
    responses(
        (status = 200, description = "All data moved source -> target", body = ApiResponse<MergeCustomersResponse>),
        (status = 400, description = "target and source are the same user"),
        (status = 404, description = "Target or source user does not exist"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn merge_customers(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MergeCustomersRequest>,
) -> Result<Json<ApiResponse<MergeCustomersResponse>>, AppError> {
    let response = customer::merge_customers(
        &state.db.pool,
        &state.bus,
        body.target_user_id,
        body.source_user_id,
    )
    .await?;

    Ok(Json(ApiResponse::ok("customers merged", response)))
}
