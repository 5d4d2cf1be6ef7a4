use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique on `(referrer, referee)`; `referrer != referee` (§3).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referee_id: Uuid,
    pub bonus_granted: bool,
    pub bonus_granted_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Two assignment modes: by local id, or by `(provider, referrer_external_id,
/// referee_external_id)` — the latter is lookup-only (§4.5).
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignReferralRequest {
    pub referrer_user_id: Option<Uuid>,
    pub referee_user_id: Option<Uuid>,
    pub provider: Option<String>,
    pub referrer_external_id: Option<String>,
    pub referee_external_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AssignReferralResponse {
    pub referral_id: Uuid,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReferralStatsResponse {
    pub referee_count: i64,
}
