use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// State transitions are monotone: ACTIVE -> any other; terminal states
/// never transition (§3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "batch_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Active,
    Exhausted,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuotaBatch {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub source_offer_id: Option<Uuid>,
    pub order_item_id: Option<Uuid>,
    pub initial_quantity: i64,
    pub remaining_quantity: i64,
    pub valid_from: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub state: BatchState,
    pub created_at: DateTime<Utc>,
}

impl QuotaBatch {
    /// An ACTIVE batch with `expires_at <= now` is considered expired by
    /// readers even before the sweeper records the transition (§3).
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.state == BatchState::Active
            && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActiveBatchResponse {
    pub id: Uuid,
    pub product_key: Option<String>,
    pub initial_quantity: i64,
    pub remaining_quantity: i64,
    pub valid_from: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub state: BatchState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn batch(state: BatchState, expires_at: Option<DateTime<Utc>>) -> QuotaBatch {
        let now = Utc::now();
        QuotaBatch {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            product_id: Uuid::now_v7(),
            source_offer_id: None,
            order_item_id: None,
            initial_quantity: 10,
            remaining_quantity: 5,
            valid_from: now,
            expires_at,
            state,
            created_at: now,
        }
    }

    #[test]
    fn active_batch_with_no_expiry_is_usable() {
        assert!(batch(BatchState::Active, None).is_usable(Utc::now()));
    }

    #[test]
    fn active_batch_with_future_expiry_is_usable() {
        let future = Utc::now() + Duration::days(1);
        assert!(batch(BatchState::Active, Some(future)).is_usable(Utc::now()));
    }

    #[test]
    fn active_batch_past_expiry_is_not_usable_even_before_sweeper_runs() {
        let past = Utc::now() - Duration::seconds(1);
        assert!(!batch(BatchState::Active, Some(past)).is_usable(Utc::now()));
    }

    #[test]
    fn non_active_batch_is_never_usable() {
        for state in [BatchState::Exhausted, BatchState::Expired, BatchState::Revoked] {
            assert!(!batch(state, None).is_usable(Utc::now()));
        }
    }
}
