use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::errors::{ApiResponse, AppError};
use crate::models::{
    ConfirmOrderRequest, CreateOrderRequest, OrderItemResponse, OrderResponse, RefundOrderRequest,
    ResolveParams,
};
use crate::services::{identity, order};
use crate::AppState;

/// POST `/orders` — CREATE order.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order created", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Validation failure or unknown SKU"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, AppError> {
    use validator::Validate;
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let resolve = ResolveParams {
        user_id: body.user_id,
        external_id: body.external_id.clone(),
        provider: body.provider.clone(),
    };
    let user_id = identity::resolve_write_params(&state.db.pool, &resolve)
        .await?
        .ok_or_else(|| AppError::Validation("user_id or external_id is required".to_string()))?;

    let created = order::create(&state.db.pool, user_id, &body.items, body.metadata.clone()).await?;
    let response = build_order_response(&state, created.order, created.items).await?;

    Ok(Json(ApiResponse::ok("order created", response)))
}

/// POST `/orders/{id}/confirm` — CONFIRM.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/confirm",
    params(("id" = uuid::Uuid, Path, description = "Order id")),
    request_body = ConfirmOrderRequest,
    responses(
        (status = 200, description = "Order confirmed (idempotent on an already-PAID order)", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found"),
        (status = 400, description = "Order in a non-confirmable state"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn confirm_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<uuid::Uuid>,
    Json(body): Json<ConfirmOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, AppError> {
    let confirmed = order::confirm(
        &state.db.pool,
        &state.bus,
        order_id,
        body.payment_id,
        body.payment_method,
    )
    .await?;
    let (_, items) = order::get(&state.db.pool, order_id).await?;
    let response = build_order_response(&state, confirmed, items).await?;
    Ok(Json(ApiResponse::ok("order confirmed", response)))
}

/// POST `/orders/{id}/refund` — REFUND.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/refund",
    params(("id" = uuid::Uuid, Path, description = "Order id")),
    request_body = RefundOrderRequest,
    responses(
        (status = 200, description = "Order refunded", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found"),
        (status = 400, description = "Order is not PAID"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn refund_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<uuid::Uuid>,
    Json(body): Json<RefundOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, AppError> {
    let refunded = order::refund(&state.db.pool, &state.bus, order_id, body.reason).await?;
    let (_, items) = order::get(&state.db.pool, order_id).await?;
    let response = build_order_response(&state, refunded, items).await?;
    Ok(Json(ApiResponse::ok("order refunded", response)))
}

/// GET `/orders/{id}` — order detail.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = uuid::Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<uuid::Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, AppError> {
    let (order, items) = order::get(&state.db.pool, order_id).await?;
    let response = build_order_response(&state, order, items).await?;
    Ok(Json(ApiResponse::ok("order", response)))
}

async fn build_order_response(
    state: &AppState,
    order: crate::models::Order,
    items: Vec<crate::models::OrderItem>,
) -> Result<OrderResponse, AppError> {
    let mut item_responses = Vec::with_capacity(items.len());
    for item in items {
        let sku = fetch_offer_sku(state, item.offer_id).await?;
        item_responses.push(OrderItemResponse {
            sku,
            quantity: item.quantity,
            price: item.price,
        });
    }

    Ok(OrderResponse {
        id: order.id,
        user_id: order.user_id,
        total_amount: order.total_amount,
        currency: order.currency,
        status: order.status,
        payment_method: order.payment_method,
        payment_id: order.payment_id,
        created_at: order.created_at,
        paid_at: order.paid_at,
        items: item_responses,
        metadata: order.metadata,
    })
}

async fn fetch_offer_sku(state: &AppState, offer_id: uuid::Uuid) -> Result<String, AppError> {
    let sku: String = sqlx::query_scalar("SELECT sku FROM offers WHERE id = $1")
        .bind(offer_id)
        .fetch_one(&state.db.pool)
        .await?;
    Ok(sku)
}
