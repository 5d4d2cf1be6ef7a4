use axum::{extract::{Query, State}, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::errors::{ApiResponse, AppError};
use crate::models::{
    ActiveBatchResponse, BalanceResponse, ConsumeRequest, ConsumeResponse, ExchangeRequest,
    ResolveParams, TransactionHistoryParams, TransactionResponse, WalletResponse,
};
use crate::services::{catalog, identity, ledger};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    #[serde(flatten)]
    pub resolve: ResolveParams,
    pub product_key: String,
}

#[derive(Debug, Deserialize)]
pub struct UserProductsQuery {
    #[serde(flatten)]
    pub resolve: ResolveParams,
    pub product_key: Option<String>,
}

/// GET `/balance` — quota check (read-only resolve).
#[utoipa::path(
    get,
    path = "/api/v1/balance",
    params(
        ("user_id" = Option<uuid::Uuid>, Query),
        ("external_id" = Option<String>, Query),
        ("provider" = Option<String>, Query),
        ("product_key" = String, Query),
    ),
    responses(
        (status = 200, description = "Balance", body = ApiResponse<BalanceResponse>),
        (status = 404, description = "Identity not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Wallet"
)]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<ApiResponse<BalanceResponse>>, AppError> {
    let user_id = identity::resolve_read_params(&state.db.pool, &query.resolve)
        .await?
        .ok_or_else(|| AppError::NotFound("identity not found".to_string()))?;
    let product_key = catalog::normalize_key(&query.product_key);
    let balance = ledger::get_balance(&state.db.pool, user_id, &product_key).await?;
    Ok(Json(ApiResponse::ok(
        "balance",
        BalanceResponse { product_key, balance },
    )))
}

/// GET `/user-products` — active batches (read-only resolve).
#[utoipa::path(
    get,
    path = "/api/v1/user-products",
    params(
        ("user_id" = Option<uuid::Uuid>, Query),
        ("external_id" = Option<String>, Query),
        ("provider" = Option<String>, Query),
        ("product_key" = Option<String>, Query),
    ),
    responses(
        (status = 200, description = "Active batches", body = ApiResponse<Vec<ActiveBatchResponse>>),
        (status = 404, description = "Identity not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Wallet"
)]
pub async fn list_user_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserProductsQuery>,
) -> Result<Json<ApiResponse<Vec<ActiveBatchResponse>>>, AppError> {
    let user_id = identity::resolve_read_params(&state.db.pool, &query.resolve)
        .await?
        .ok_or_else(|| AppError::NotFound("identity not found".to_string()))?;
    let batches = ledger::list_active_batches(&state.db.pool, user_id, query.product_key.as_deref()).await?;
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
    Ok(Json(ApiResponse::ok("user products", response)))
}

/// GET `/wallet` — aggregate balances.
#[utoipa::path(
    get,
    path = "/api/v1/wallet",
    params(
        ("user_id" = Option<uuid::Uuid>, Query),
        ("external_id" = Option<String>, Query),
        ("provider" = Option<String>, Query),
    ),
    responses(
        (status = 200, description = "Aggregate balances by product key", body = ApiResponse<WalletResponse>),
        (status = 404, description = "Identity not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Wallet"
)]
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Query(resolve): Query<ResolveParams>,
) -> Result<Json<ApiResponse<WalletResponse>>, AppError> {
    let user_id = identity::resolve_read_params(&state.db.pool, &resolve)
        .await?
        .ok_or_else(|| AppError::NotFound("identity not found".to_string()))?;
    let balances = ledger::get_wallet(&state.db.pool, user_id).await?;
    Ok(Json(ApiResponse::ok("wallet", WalletResponse { balances })))
}

/// GET `/wallet/batches` — detailed active batches.
#[utoipa::path(
    get,
    path = "/api/v1/wallet/batches",
    params(
        ("user_id" = Option<uuid::Uuid>, Query),
        ("external_id" = Option<String>, Query),
        ("provider" = Option<String>, Query),
        ("product_key" = Option<String>, Query),
    ),
    responses(
        (status = 200, description = "Detailed active batches", body = ApiResponse<Vec<ActiveBatchResponse>>),
        (status = 404, description = "Identity not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Wallet"
)]
pub async fn list_batches(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserProductsQuery>,
) -> Result<Json<ApiResponse<Vec<ActiveBatchResponse>>>, AppError> {
    list_user_products(State(state), Query(query)).await
}

/// GET `/wallet/transactions` — history, filterable, newest-first, capped at
/// 100 rows.
#[utoipa::path(
    get,
    path = "/api/v1/wallet/transactions",
    params(
        ("user_id" = Option<uuid::Uuid>, Query),
        ("external_id" = Option<String>, Query),
        ("provider" = Option<String>, Query),
        ("product_key" = Option<String>, Query),
        ("action_type" = Option<String>, Query),
        ("date_from" = Option<chrono::DateTime<chrono::Utc>>, Query),
    ),
    responses(
        (status = 200, description = "History, newest-first, capped at 100", body = ApiResponse<Vec<TransactionResponse>>),
        (status = 404, description = "Identity not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Wallet"
)]
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TransactionHistoryParams>,
) -> Result<Json<ApiResponse<Vec<TransactionResponse>>>, AppError> {
    let resolve = ResolveParams {
        user_id: params.user_id,
        external_id: params.external_id.clone(),
        provider: params.provider.clone(),
    };
    let user_id = identity::resolve_read_params(&state.db.pool, &resolve)
        .await?
        .ok_or_else(|| AppError::NotFound("identity not found".to_string()))?;

    let product_key = params.product_key.as_deref().map(catalog::normalize_key);

    #[derive(sqlx::FromRow)]
    struct Row {
        id: uuid::Uuid,
        product_key: Option<String>,
        amount: rust_decimal::Decimal,
        direction: crate::models::TransactionDirection,
        action_type: String,
        metadata: serde_json::Value,
        created_at: chrono::DateTime<chrono::Utc>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        "SELECT t.id, p.product_key, t.amount, t.direction, t.action_type, t.metadata, t.created_at
         FROM transactions t
         JOIN quota_batches qb ON qb.id = t.quota_batch_id
         JOIN products p ON p.id = qb.product_id
         WHERE t.user_id = $1
           AND ($2::text IS NULL OR UPPER(p.product_key) = $2)
           AND ($3::text IS NULL OR t.action_type = $3)
           AND ($4::timestamptz IS NULL OR t.created_at >= $4)
         ORDER BY t.created_at DESC
         LIMIT 100",
    )
    .bind(user_id)
    .bind(&product_key)
    .bind(&params.action_type)
    .bind(params.date_from)
    .fetch_all(&state.db.pool)
    .await?;

    let response = rows
        .into_iter()
        .map(|r| TransactionResponse {
            id: r.id,
            product_key: r.product_key,
            amount: r.amount,
            direction: r.direction,
            action_type: r.action_type,
            metadata: r.metadata,
            created_at: r.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::ok("transactions", response)))
}

/// POST `/wallet/consume` — CONSUME (write-resolve).
#[utoipa::path(
    post,
    path = "/api/v1/wallet/consume",
    request_body = ConsumeRequest,
    responses(
        (status = 200, description = "Quota consumed (idempotent on idempotency_key)", body = ApiResponse<ConsumeResponse>),
        (status = 400, description = "quota_exhausted or insufficient_funds"),
    ),
    security(("bearer_auth" = [])),
    tag = "Wallet"
)]
pub async fn consume(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConsumeRequest>,
) -> Result<Json<ApiResponse<ConsumeResponse>>, AppError> {
    let resolve = ResolveParams {
        user_id: body.user_id,
        external_id: body.external_id.clone(),
        provider: body.provider.clone(),
    };
    let user_id = identity::resolve_write_params(&state.db.pool, &resolve)
        .await?
        .ok_or_else(|| AppError::Validation("user_id or external_id is required".to_string()))?;

    let outcome = ledger::consume(
        &state.db.pool,
        &state.bus,
        user_id,
        &body.product_key,
        body.amount,
        &body.action_type,
        body.action_id.as_deref(),
        body.idempotency_key.as_deref(),
        body.metadata.clone(),
    )
    .await?;

    Ok(Json(ApiResponse::ok(
        "quota consumed",
        ConsumeResponse {
            usage_id: outcome.usage_id,
            remaining: outcome.remaining,
            metadata: outcome.metadata,
        },
    )))
}

/// POST `/exchange` — EXCHANGE.
#[utoipa::path(
    post,
    path = "/api/v1/exchange",
    request_body = ExchangeRequest,
    responses(
        (status = 200, description = "Exchange completed", body = ApiResponse<Vec<crate::models::ActiveBatchResponse>>),
        (status = 400, description = "Currency product missing, not marked is_currency, or insufficient balance"),
        (status = 404, description = "Offer not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Wallet"
)]
pub async fn exchange(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExchangeRequest>,
) -> Result<Json<ApiResponse<Vec<crate::models::ActiveBatchResponse>>>, AppError> {
    let resolve = ResolveParams {
        user_id: body.user_id,
        external_id: body.external_id.clone(),
        provider: body.provider.clone(),
    };
    let user_id = identity::resolve_write_params(&state.db.pool, &resolve)
        .await?
        .ok_or_else(|| AppError::Validation("user_id or external_id is required".to_string()))?;

    let offer = catalog::get_offer_by_sku(&state.db.pool, &body.sku)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("offer {} not found", body.sku)))?;
    let items = catalog::get_offer_items(&state.db.pool, offer.id).await?;

    let batches = ledger::exchange(&state.db.pool, &state.bus, user_id, &offer, &items, None).await?;

    let response = batches
        .into_iter()
        .map(|b| ActiveBatchResponse {
            id: b.id,
            product_key: None,
            initial_quantity: b.initial_quantity,
            remaining_quantity: b.remaining_quantity,
            valid_from: b.valid_from,
            expires_at: b.expires_at,
            state: b.state,
        })
        .collect();

    Ok(Json(ApiResponse::ok("exchange completed", response)))
}
