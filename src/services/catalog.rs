//! Catalog service (§4.2): read-only product/offer lookups. SKU and
//! product-key matching is case-insensitive; callers normalize to upper
//! case before querying so index lookups stay exact-match.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Offer, OfferItem, Product};

pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub async fn list_active_products(pool: &PgPool) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM products WHERE is_active = TRUE ORDER BY name")
        .fetch_all(pool)
        .await
}

pub async fn get_product_by_key(
    pool: &PgPool,
    product_key: &str,
) -> Result<Option<Product>, sqlx::Error> {
    let key = normalize_key(product_key);
    sqlx::query_as("SELECT * FROM products WHERE UPPER(product_key) = $1")
        .bind(key)
        .fetch_optional(pool)
        .await
}

pub async fn get_product_by_id(
    pool: &PgPool,
    product_id: Uuid,
) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_active_offers(pool: &PgPool) -> Result<Vec<Offer>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM offers WHERE is_active = TRUE ORDER BY name")
        .fetch_all(pool)
        .await
}

/// Any offer by SKU, active or not. Used by internal paths (order creation's
/// inactive-offer fallback, refund trace) where §4.2's `is_active=true`
/// filter is explicitly waived.
pub async fn get_offer_by_sku_any(
    pool: &PgPool,
    sku: &str,
) -> Result<Option<Offer>, sqlx::Error> {
    let sku = normalize_key(sku);
    sqlx::query_as("SELECT * FROM offers WHERE UPPER(sku) = $1")
        .bind(sku)
        .fetch_optional(pool)
        .await
}

/// One active offer by SKU, for public catalog lookups.
pub async fn get_offer_by_sku(
    pool: &PgPool,
    sku: &str,
) -> Result<Option<Offer>, sqlx::Error> {
    let sku = normalize_key(sku);
    sqlx::query_as("SELECT * FROM offers WHERE UPPER(sku) = $1 AND is_active = TRUE")
        .bind(sku)
        .fetch_optional(pool)
        .await
}

/// Looks up active offers by SKU, preserving the order of `skus` and leaving
/// a `None` hole for anything that doesn't resolve (missing or inactive) so
/// callers can report exactly which SKU failed.
pub async fn get_offers_by_skus(
    pool: &PgPool,
    skus: &[String],
) -> Result<Vec<Option<Offer>>, sqlx::Error> {
    let mut out = Vec::with_capacity(skus.len());
    for sku in skus {
        out.push(get_offer_by_sku(pool, sku).await?);
    }
    Ok(out)
}

pub async fn get_offer_items(
    pool: &PgPool,
    offer_id: Uuid,
) -> Result<Vec<OfferItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM offer_items WHERE offer_id = $1 ORDER BY id")
        .bind(offer_id)
        .fetch_all(pool)
        .await
}
