use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "transaction_direction", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionDirection {
    Credit,
    Debit,
}

/// Known `action_type` literals. The column itself stays a free-form
/// `String` per spec ("free-form label") — these are just the values the
/// ledger core itself ever writes.
pub mod action_types {
    pub const PURCHASE: &str = "purchase";
    pub const TRIAL_ACTIVATION: &str = "trial_activation";
    pub const USAGE: &str = "usage";
    pub const REFUND: &str = "refund";
    pub const EXCHANGE: &str = "exchange";
    pub const MANUAL_GRANT: &str = "manual_grant";
}

/// Immutable ledger entry. Never mutated or deleted (§3, §8).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub quota_batch_id: Uuid,
    pub amount: Decimal,
    pub direction: TransactionDirection,
    pub action_type: String,
    /// Polymorphic reference: order item FK when granted from an order,
    /// or a free-form external action id (CONSUME's `action_id`).
    pub related_order_item_id: Option<Uuid>,
    pub action_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConsumeRequest {
    pub user_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub provider: Option<String>,
    pub product_key: String,
    pub action_type: String,
    #[serde(default = "default_consume_amount")]
    pub amount: i64,
    pub action_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

fn default_consume_amount() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConsumeResponse {
    pub usage_id: Uuid,
    pub remaining: Decimal,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ExchangeRequest {
    pub user_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub provider: Option<String>,
    pub sku: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub product_key: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WalletResponse {
    pub balances: std::collections::HashMap<String, Decimal>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransactionHistoryParams {
    pub user_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub provider: Option<String>,
    pub product_key: Option<String>,
    pub action_type: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub product_key: Option<String>,
    pub amount: Decimal,
    pub direction: TransactionDirection,
    pub action_type: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
