use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique on `(identity_type, identity_hash)`. `identity_hash` is SHA-256 of
/// the lower-cased, trimmed identity value (§3, §4.5 — the one place
/// normalization is lower-case rather than upper-case).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrialHistory {
    pub id: Uuid,
    pub identity_type: String,
    pub identity_hash: String,
    pub trial_plan_name: String,
    pub used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TrialGrantRequest {
    pub user_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub provider: Option<String>,
    pub sku: String,
}
