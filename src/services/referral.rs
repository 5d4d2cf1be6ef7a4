//! Referral & trial (§4.5): referrer/referee linkage and trial-reuse
//! prevention via hashed identity.

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{DomainEvent, EventBus};
use crate::models::{Offer, OfferItem, Referral};
use crate::services::ledger;

#[derive(Debug, thiserror::Error)]
pub enum ReferralError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    State(String),
    #[error(transparent)]
    Ledger(#[from] ledger::LedgerError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<ReferralError> for AppError {
    fn from(err: ReferralError) -> Self {
        match err {
            ReferralError::Validation(msg) => AppError::Validation(msg),
            ReferralError::NotFound(msg) => AppError::NotFound(msg),
            ReferralError::State(msg) => AppError::State(msg),
            ReferralError::Ledger(e) => e.into(),
            ReferralError::Database(e) => e.into(),
        }
    }
}

pub struct AssignOutcome {
    pub referral: Referral,
    pub created: bool,
}

/// Creates a referrer/referee link. Self-referral is rejected; duplicate
/// assignment is idempotent (`created=false`).
pub async fn assign(
    pool: &PgPool,
    bus: &EventBus,
    referrer_id: Uuid,
    referee_id: Uuid,
    metadata: Option<serde_json::Value>,
) -> Result<AssignOutcome, ReferralError> {
    if referrer_id == referee_id {
        return Err(ReferralError::Validation(
            "referrer and referee must not be the same user".to_string(),
        ));
    }

    let existing: Option<Referral> = sqlx::query_as(
        "SELECT * FROM referrals WHERE referrer_id = $1 AND referee_id = $2",
    )
    .bind(referrer_id)
    .bind(referee_id)
    .fetch_optional(pool)
    .await?;

    if let Some(referral) = existing {
        return Ok(AssignOutcome {
            referral,
            created: false,
        });
    }

    let metadata = metadata.unwrap_or(serde_json::json!({}));
    let referral: Referral = sqlx::query_as(
        "INSERT INTO referrals (referrer_id, referee_id, bonus_granted, metadata)
         VALUES ($1, $2, FALSE, $3)
         RETURNING *",
    )
    .bind(referrer_id)
    .bind(referee_id)
    .bind(&metadata)
    .fetch_one(pool)
    .await?;

    bus.publish(DomainEvent::ReferralAttached {
        referral_id: referral.id,
        referrer_id,
        referee_id,
    });

    Ok(AssignOutcome {
        referral,
        created: true,
    })
}

pub async fn referee_count(pool: &PgPool, referrer_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM referrals WHERE referrer_id = $1")
        .bind(referrer_id)
        .fetch_one(pool)
        .await
}

fn hash_identity(value: &str) -> String {
    let normalized = value.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_identity_is_case_and_whitespace_insensitive() {
        assert_eq!(hash_identity("User@Example.com"), hash_identity(" user@example.com "));
        assert_eq!(hash_identity("USER@EXAMPLE.COM"), hash_identity("user@example.com"));
    }

    #[test]
    fn hash_identity_differs_for_different_values() {
        assert_ne!(hash_identity("alice@example.com"), hash_identity("bob@example.com"));
    }

    #[test]
    fn hash_identity_is_hex_sha256() {
        let digest = hash_identity("probe");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

/// Trial grant (reference implementation): query `TrialHistory` by the
/// SHA-256 hash of the lower-cased identity value before granting; insert
/// one row per supplied identity on success.
pub async fn grant_trial(
    pool: &PgPool,
    bus: &EventBus,
    user_id: Uuid,
    identity_type: &str,
    identity_value: &str,
    offer: &Offer,
    offer_items: &[OfferItem],
) -> Result<(), ReferralError> {
    let identity_hash = hash_identity(identity_value);

    let already_used: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM trial_history WHERE identity_type = $1 AND identity_hash = $2",
    )
    .bind(identity_type)
    .bind(&identity_hash)
    .fetch_optional(pool)
    .await?;

    if already_used.is_some() {
        return Err(ReferralError::State("trial_already_used".to_string()));
    }
    if offer_items.is_empty() {
        return Err(ReferralError::NotFound("trial offer grants nothing".to_string()));
    }

    ledger::grant(
        pool,
        bus,
        user_id,
        offer,
        offer_items,
        1,
        crate::models::action_types::TRIAL_ACTIVATION,
        None,
        None,
    )
    .await?;

    sqlx::query(
        "INSERT INTO trial_history (identity_type, identity_hash, trial_plan_name, used_at)
         VALUES ($1, $2, $3, NOW())",
    )
    .bind(identity_type)
    .bind(&identity_hash)
    .bind(&offer.sku)
    .execute(pool)
    .await?;

    bus.publish(DomainEvent::TrialActivated {
        user_id,
        trial_plan_name: offer.sku.clone(),
    });

    Ok(())
}

/// Referral-bonus bookkeeping: grants `offer_sku` to the referrer and flips
/// `bonus_granted`/`bonus_granted_at`. Not exposed as its own HTTP endpoint;
/// callable by an external bonus-computation job.
pub async fn grant_referral_bonus(
    pool: &PgPool,
    bus: &EventBus,
    referral_id: Uuid,
    offer: &Offer,
    offer_items: &[OfferItem],
) -> Result<(), ReferralError> {
    let referral: Referral = sqlx::query_as("SELECT * FROM referrals WHERE id = $1 FOR UPDATE")
        .bind(referral_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ReferralError::NotFound(format!("referral {referral_id} not found")))?;

    if referral.bonus_granted {
        return Ok(());
    }

    ledger::grant(
        pool,
        bus,
        referral.referrer_id,
        offer,
        offer_items,
        1,
        crate::models::action_types::MANUAL_GRANT,
        None,
        None,
    )
    .await?;

    sqlx::query(
        "UPDATE referrals SET bonus_granted = TRUE, bonus_granted_at = NOW() WHERE id = $1",
    )
    .bind(referral_id)
    .execute(pool)
    .await?;

    Ok(())
}
