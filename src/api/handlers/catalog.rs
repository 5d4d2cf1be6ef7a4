use axum::{
    extract::{Path, RawQuery, State},
    Json,
};
use std::sync::Arc;

use crate::errors::{ApiResponse, AppError};
use crate::models::{OfferItemResponse, OfferResponse, ProductResponse};
use crate::services::catalog;
use crate::AppState;

/// GET `/products` — list active products.
#[utoipa::path(
    get,
    path = "/api/v1/products",
    responses((status = 200, description = "Active products", body = ApiResponse<Vec<ProductResponse>>)),
    security(("bearer_auth" = [])),
    tag = "Catalog"
)]
pub async fn list_products(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ProductResponse>>>, AppError> {
    let products = catalog::list_active_products(&state.db.pool).await?;
    let response: Vec<ProductResponse> = products.into_iter().map(ProductResponse::from).collect();
    Ok(Json(ApiResponse::ok("products", response)))
}

/// GET `/products/{product_key}` — one product.
#[utoipa::path(
    get,
    path = "/api/v1/products/{product_key}",
    params(("product_key" = String, Path, description = "Normalized product key")),
    responses(
        (status = 200, description = "Product", body = ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Catalog"
)]
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(product_key): Path<String>,
) -> Result<Json<ApiResponse<ProductResponse>>, AppError> {
    let product = catalog::get_product_by_key(&state.db.pool, &product_key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {product_key} not found")))?;
    Ok(Json(ApiResponse::ok("product", ProductResponse::from(product))))
}

/// GET `/catalog` — list active offers; an optional repeatable `sku=` query
/// parameter restricts and orders the result by the caller's SKU list.
/// Parsed from the raw query string since simple form-encoding does not
/// reliably decode repeated keys into a `Vec`.
#[utoipa::path(
    get,
    path = "/api/v1/catalog",
    params(("sku" = Option<Vec<String>>, Query, description = "Repeatable; restricts and orders the result")),
    responses((status = 200, description = "Active offers", body = ApiResponse<Vec<OfferResponse>>)),
    security(("bearer_auth" = [])),
    tag = "Catalog"
)]
pub async fn list_offers(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<ApiResponse<Vec<OfferResponse>>>, AppError> {
    let requested_skus = parse_repeated_sku(query.as_deref());

    let offers = if requested_skus.is_empty() {
        catalog::list_active_offers(&state.db.pool).await?
    } else {
        catalog::get_offers_by_skus(&state.db.pool, &requested_skus)
            .await?
            .into_iter()
            .flatten()
            .collect()
    };

    let mut response = Vec::with_capacity(offers.len());
    for offer in offers {
        response.push(build_offer_response(&state, offer).await?);
    }
    Ok(Json(ApiResponse::ok("offers", response)))
}

/// GET `/catalog/{sku}` — one active offer.
#[utoipa::path(
    get,
    path = "/api/v1/catalog/{sku}",
    params(("sku" = String, Path, description = "Normalized offer SKU")),
    responses(
        (status = 200, description = "Offer", body = ApiResponse<OfferResponse>),
        (status = 404, description = "Offer not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Catalog"
)]
pub async fn get_offer(
    State(state): State<Arc<AppState>>,
    Path(sku): Path<String>,
) -> Result<Json<ApiResponse<OfferResponse>>, AppError> {
    let offer = catalog::get_offer_by_sku(&state.db.pool, &sku)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("offer {sku} not found")))?;
    let response = build_offer_response(&state, offer).await?;
    Ok(Json(ApiResponse::ok("offer", response)))
}

async fn build_offer_response(state: &AppState, offer: crate::models::Offer) -> Result<OfferResponse, AppError> {
    let items = catalog::get_offer_items(&state.db.pool, offer.id).await?;
    let mut item_responses = Vec::with_capacity(items.len());
    for item in items {
        let product = catalog::get_product_by_id(&state.db.pool, item.product_id).await?;
        item_responses.push(OfferItemResponse {
            product_key: product.and_then(|p| p.product_key),
            quantity: item.quantity,
            period_unit: item.period_unit,
            period_value: item.period_value,
        });
    }
    Ok(OfferResponse {
        sku: offer.sku,
        name: offer.name,
        price: offer.price,
        currency: offer.currency,
        is_active: offer.is_active,
        items: item_responses,
        metadata: offer.metadata,
    })
}

fn parse_repeated_sku(query: Option<&str>) -> Vec<String> {
    let Some(query) = query else {
        return Vec::new();
    };
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == "sku" && !value.is_empty()).then(|| value.to_string())
        })
        .collect()
}
