use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Unique on `(provider, external_id)` (§3).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExternalIdentity {
    pub id: Uuid,
    pub provider: String,
    pub external_id: String,
    pub user_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct IdentifyRequest {
    pub provider: Option<String>,
    #[validate(length(min = 1, message = "external_id must not be empty"))]
    pub external_id: String,
    pub profile: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IdentifyResponse {
    pub user_id: Uuid,
    pub identity_id: Uuid,
    pub provider: String,
    pub external_id: String,
    pub created_identity: bool,
    pub created_user: bool,
    pub trial_eligible: bool,
    pub metadata: serde_json::Value,
}

/// Common query parameters accepted by every resolve-then-act endpoint:
/// either a direct `user_id`, or an `external_id` (+ optional `provider`).
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ResolveParams {
    pub user_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub provider: Option<String>,
}

impl ResolveParams {
    pub fn provider_or_default(&self) -> &str {
        self.provider.as_deref().unwrap_or("default")
    }
}
