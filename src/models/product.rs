use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A unit of accounting. `product_key` and `Offer::sku` share one namespace
/// and must never collide (§9 "Shared namespace").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "product_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Period,
    Quantity,
    Unlimited,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub product_key: Option<String>,
    pub name: String,
    pub product_type: ProductType,
    pub is_active: bool,
    pub is_currency: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub product_key: Option<String>,
    pub name: String,
    pub product_type: ProductType,
    pub is_active: bool,
    pub is_currency: bool,
    pub metadata: serde_json::Value,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            product_key: p.product_key,
            name: p.name,
            product_type: p.product_type,
            is_active: p.is_active,
            is_currency: p.is_currency,
            metadata: p.metadata,
        }
    }
}
