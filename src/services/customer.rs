//! Customer merge (§9): moves all data `source -> target` transactionally.
//! `source` is not deleted, only its data is moved.

use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{DomainEvent, EventBus};
use crate::models::MergeCustomersResponse;

#[derive(Debug, thiserror::Error)]
pub enum CustomerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<CustomerError> for AppError {
    fn from(err: CustomerError) -> Self {
        match err {
            CustomerError::Validation(msg) => AppError::Validation(msg),
            CustomerError::NotFound(msg) => AppError::NotFound(msg),
            CustomerError::Conflict(msg) => AppError::Conflict(msg),
            CustomerError::Database(e) => e.into(),
        }
    }
}

pub async fn merge_customers(
    pool: &PgPool,
    bus: &EventBus,
    target_user_id: Uuid,
    source_user_id: Uuid,
) -> Result<MergeCustomersResponse, CustomerError> {
    if target_user_id == source_user_id {
        return Err(CustomerError::Validation(
            "target and source users must be different".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let target_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(target_user_id)
        .fetch_one(&mut *tx)
        .await?;
    if !target_exists {
        return Err(CustomerError::NotFound(format!(
            "target user {target_user_id} does not exist"
        )));
    }
    let source_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(source_user_id)
        .fetch_one(&mut *tx)
        .await?;
    if !source_exists {
        return Err(CustomerError::NotFound(format!(
            "source user {source_user_id} does not exist"
        )));
    }

    let mut moved_identities = 0i64;
    let source_identities: Vec<(Uuid, String, String)> = sqlx::query_as(
        "SELECT id, provider, external_id FROM external_identities WHERE user_id = $1",
    )
    .bind(source_user_id)
    .fetch_all(&mut *tx)
    .await?;

    for (identity_id, provider, external_id) in source_identities {
        let conflicting: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT id, external_id FROM external_identities WHERE user_id = $1 AND provider = $2",
        )
        .bind(target_user_id)
        .bind(&provider)
        .fetch_optional(&mut *tx)
        .await?;

        match conflicting {
            Some((_, target_external_id)) if target_external_id == external_id => {
                sqlx::query("DELETE FROM external_identities WHERE id = $1")
                    .bind(identity_id)
                    .execute(&mut *tx)
                    .await?;
            }
            Some(_) => {
                return Err(CustomerError::Conflict(format!(
                    "identity conflict: both users have different external_ids for provider {provider}"
                )));
            }
            None => {
                sqlx::query("UPDATE external_identities SET user_id = $1 WHERE id = $2")
                    .bind(target_user_id)
                    .bind(identity_id)
                    .execute(&mut *tx)
                    .await?;
                moved_identities += 1;
            }
        }
    }

    let moved_orders = sqlx::query("UPDATE orders SET user_id = $1 WHERE user_id = $2")
        .bind(target_user_id)
        .bind(source_user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected() as i64;

    let moved_batches = sqlx::query("UPDATE quota_batches SET user_id = $1 WHERE user_id = $2")
        .bind(target_user_id)
        .bind(source_user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected() as i64;

    let moved_transactions = sqlx::query("UPDATE transactions SET user_id = $1 WHERE user_id = $2")
        .bind(target_user_id)
        .bind(source_user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected() as i64;

    // A self-referral would appear if source referred target or target
    // referred source: remapping either side to target alone would collide
    // into (target, target), which the table's non-deferrable
    // `referrer_id <> referee_id` CHECK rejects immediately. Drop those
    // links before remapping rather than after — the CHECK fires inline on
    // each UPDATE, so there is no window in which to clean up afterward.
    sqlx::query(
        "DELETE FROM referrals
         WHERE (referrer_id = $1 AND referee_id = $2) OR (referrer_id = $2 AND referee_id = $1)",
    )
    .bind(source_user_id)
    .bind(target_user_id)
    .execute(&mut *tx)
    .await?;

    let moved_referrer = sqlx::query("UPDATE referrals SET referrer_id = $1 WHERE referrer_id = $2")
        .bind(target_user_id)
        .bind(source_user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected() as i64;
    let moved_referee = sqlx::query("UPDATE referrals SET referee_id = $1 WHERE referee_id = $2")
        .bind(target_user_id)
        .bind(source_user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected() as i64;

    tx.commit().await?;

    bus.publish(DomainEvent::CustomersMerged {
        target_user_id,
        source_user_id,
    });

    Ok(MergeCustomersResponse {
        target_user_id,
        moved_orders,
        moved_batches,
        moved_transactions,
        moved_identities,
        moved_referrals: moved_referrer + moved_referee,
    })
}
