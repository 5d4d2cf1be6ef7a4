use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Moves all data `source -> target` (§9 "Customer merge").
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MergeCustomersRequest {
    pub target_user_id: Uuid,
    pub source_user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MergeCustomersResponse {
    pub target_user_id: Uuid,
    pub moved_orders: i64,
    pub moved_batches: i64,
    pub moved_transactions: i64,
    pub moved_identities: i64,
    pub moved_referrals: i64,
}
