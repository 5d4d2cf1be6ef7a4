use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "period_unit", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    Hours,
    Days,
    Months,
    Years,
    Forever,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Offer {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub is_active: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OfferItem {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
    pub period_unit: PeriodUnit,
    /// Required unless `period_unit == Forever`.
    pub period_value: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OfferItemResponse {
    pub product_key: Option<String>,
    pub quantity: i64,
    pub period_unit: PeriodUnit,
    pub period_value: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OfferResponse {
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
    pub is_active: bool,
    pub items: Vec<OfferItemResponse>,
    pub metadata: serde_json::Value,
}
