//! Ledger core (§4.3): GRANT, CONSUME, EXPIRE, REVOKE, EXCHANGE plus the
//! balance view. The sole writer of `QuotaBatch` and `Transaction`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{DomainEvent, EventBus};
use crate::models::{BatchState, Offer, OfferItem, Product, QuotaBatch, TransactionDirection};
use crate::services::{catalog, period};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    QuotaExhausted { message: String },
    #[error("{message}")]
    InsufficientFunds { message: String },
    #[error("{0}")]
    State(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(msg) => AppError::Validation(msg),
            LedgerError::NotFound(msg) => AppError::NotFound(msg),
            LedgerError::QuotaExhausted { message } => AppError::Quota {
                code: "quota_exhausted",
                message,
            },
            LedgerError::InsufficientFunds { message } => AppError::Quota {
                code: "insufficient_funds",
                message,
            },
            LedgerError::State(msg) => AppError::State(msg),
            LedgerError::Database(e) => e.into(),
        }
    }
}

pub struct ConsumeOutcome {
    pub usage_id: Uuid,
    pub remaining: Decimal,
    pub metadata: serde_json::Value,
}

/// One batch's share of a FIFO debit: how much was taken from it and what
/// its remaining quantity/state become.
struct Allocation {
    batch_id: Uuid,
    take: i64,
    new_remaining: i64,
    new_state: BatchState,
}

/// Walks `batches` (already FIFO-ordered) taking `amount` total, oldest
/// first. Callers must have already verified `amount <= sum(remaining)`;
/// the walk simply stops once `amount` is satisfied.
fn allocate_fifo(batches: &[QuotaBatch], amount: i64) -> Vec<Allocation> {
    let mut remaining_needed = amount;
    let mut allocations = Vec::new();

    for batch in batches {
        if remaining_needed <= 0 {
            break;
        }
        let take = batch.remaining_quantity.min(remaining_needed);
        let new_remaining = batch.remaining_quantity - take;
        let new_state = if new_remaining == 0 {
            BatchState::Exhausted
        } else {
            BatchState::Active
        };
        allocations.push(Allocation {
            batch_id: batch.id,
            take,
            new_remaining,
            new_state,
        });
        remaining_needed -= take;
    }

    allocations
}

/// GRANT, run in its own transaction. Use [`grant_in_tx`] to compose with an
/// enclosing transaction (order confirm, exchange).
pub async fn grant(
    pool: &PgPool,
    bus: &EventBus,
    user_id: Uuid,
    offer: &Offer,
    items: &[OfferItem],
    multiplier: i64,
    source: &str,
    order_item_id: Option<Uuid>,
    metadata: Option<serde_json::Value>,
) -> Result<Vec<QuotaBatch>, LedgerError> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    let (batches, events) = grant_in_tx(
        &mut tx,
        now,
        user_id,
        Some(offer.id),
        items,
        multiplier,
        source,
        order_item_id,
        metadata,
    )
    .await?;
    tx.commit().await?;
    for event in events {
        bus.publish(event);
    }
    Ok(batches)
}

/// Core GRANT logic, composable inside a caller-owned transaction. Atomic:
/// all batches for the offer are written or none (the caller's `tx` rolls
/// back on error).
pub async fn grant_in_tx(
    tx: &mut SqlxTransaction<'_, Postgres>,
    now: DateTime<Utc>,
    user_id: Uuid,
    source_offer_id: Option<Uuid>,
    items: &[OfferItem],
    multiplier: i64,
    source: &str,
    order_item_id: Option<Uuid>,
    metadata: Option<serde_json::Value>,
) -> Result<(Vec<QuotaBatch>, Vec<DomainEvent>), LedgerError> {
    let metadata = metadata.unwrap_or(serde_json::json!({}));
    let mut batches = Vec::with_capacity(items.len());
    let mut events = Vec::with_capacity(items.len());

    for item in items {
        let expires_at = period::compute_expiry(now, item.period_unit, item.period_value);
        let total_quantity = item.quantity * multiplier;

        let batch: QuotaBatch = sqlx::query_as(
            "INSERT INTO quota_batches
                (id, user_id, product_id, source_offer_id, order_item_id,
                 initial_quantity, remaining_quantity, valid_from, expires_at, state)
             VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8, 'active')
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(item.product_id)
        .bind(source_offer_id)
        .bind(order_item_id)
        .bind(total_quantity)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&mut **tx)
        .await?;

        let transaction_id: Uuid = sqlx::query_scalar(
            "INSERT INTO transactions
                (id, user_id, quota_batch_id, amount, direction, action_type,
                 related_order_item_id, action_id, metadata)
             VALUES ($1, $2, $3, $4, 'credit', $5, $6, NULL, $7)
             RETURNING id",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(batch.id)
        .bind(Decimal::from(total_quantity))
        .bind(source)
        .bind(order_item_id)
        .bind(&metadata)
        .fetch_one(&mut **tx)
        .await?;

        events.push(DomainEvent::TransactionCreated {
            transaction_id,
            user_id,
            quota_batch_id: batch.id,
            direction: TransactionDirection::Credit,
            amount: Decimal::from(total_quantity),
            action_type: source.to_string(),
        });

        batches.push(batch);
    }

    Ok((batches, events))
}

/// CONSUME, run in its own transaction.
#[allow(clippy::too_many_arguments)]
pub async fn consume(
    pool: &PgPool,
    bus: &EventBus,
    user_id: Uuid,
    product_key: &str,
    amount: i64,
    action_type: &str,
    action_id: Option<&str>,
    idempotency_key: Option<&str>,
    metadata: Option<serde_json::Value>,
) -> Result<ConsumeOutcome, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::Validation(
            "amount must be a positive integer".to_string(),
        ));
    }
    let product_key = catalog::normalize_key(product_key);
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    if let Some(key) = idempotency_key {
        if let Some(existing) = find_idempotent_transaction(&mut tx, user_id, action_type, key).await? {
            let remaining = balance_in_tx(&mut tx, user_id, &product_key, now).await?;
            tx.commit().await?;
            return Ok(ConsumeOutcome {
                usage_id: existing.0,
                remaining,
                metadata: existing.1,
            });
        }
    }

    let batches: Vec<QuotaBatch> = sqlx::query_as(
        "SELECT qb.* FROM quota_batches qb
         JOIN products p ON p.id = qb.product_id
         WHERE qb.user_id = $1 AND UPPER(p.product_key) = $2 AND qb.state = 'active'
           AND (qb.expires_at IS NULL OR qb.expires_at > $3)
         ORDER BY qb.created_at ASC, qb.id ASC
         FOR UPDATE OF qb",
    )
    .bind(user_id)
    .bind(&product_key)
    .bind(now)
    .fetch_all(&mut *tx)
    .await?;

    let total_available: i64 = batches.iter().map(|b| b.remaining_quantity).sum();

    if total_available == 0 {
        return Err(LedgerError::QuotaExhausted {
            message: format!("No active quota for {product_key}"),
        });
    }
    if total_available < amount {
        return Err(LedgerError::InsufficientFunds {
            message: "Insufficient balance".to_string(),
        });
    }

    let metadata = metadata.unwrap_or(serde_json::json!({}));
    let mut tx_metadata = match &metadata {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    match idempotency_key {
        Some(key) => {
            tx_metadata.insert("idempotency_key".to_string(), serde_json::Value::String(key.to_string()));
        }
        None => {
            tx_metadata.insert("idempotency_key".to_string(), serde_json::Value::Null);
        }
    }
    let tx_metadata = serde_json::Value::Object(tx_metadata);

    let mut last_transaction_id = None;
    let mut events = Vec::new();

    for allocation in allocate_fifo(&batches, amount) {
        sqlx::query("UPDATE quota_batches SET remaining_quantity = $1, state = $2 WHERE id = $3")
            .bind(allocation.new_remaining)
            .bind(allocation.new_state)
            .bind(allocation.batch_id)
            .execute(&mut *tx)
            .await?;

        let transaction_id: Uuid = sqlx::query_scalar(
            "INSERT INTO transactions
                (id, user_id, quota_batch_id, amount, direction, action_type, action_id, metadata)
             VALUES ($1, $2, $3, $4, 'debit', $5, $6, $7)
             RETURNING id",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(allocation.batch_id)
        .bind(Decimal::from(allocation.take))
        .bind(action_type)
        .bind(action_id)
        .bind(&tx_metadata)
        .fetch_one(&mut *tx)
        .await?;

        events.push(DomainEvent::TransactionCreated {
            transaction_id,
            user_id,
            quota_batch_id: allocation.batch_id,
            direction: TransactionDirection::Debit,
            amount: Decimal::from(allocation.take),
            action_type: action_type.to_string(),
        });
        events.push(DomainEvent::QuotaConsumed {
            user_id,
            product_key: product_key.clone(),
            amount: Decimal::from(allocation.take),
            action_type: action_type.to_string(),
        });

        last_transaction_id = Some(transaction_id);
    }

    let remaining = balance_in_tx(&mut tx, user_id, &product_key, now).await?;
    tx.commit().await?;
    for event in events {
        bus.publish(event);
    }

    Ok(ConsumeOutcome {
        usage_id: last_transaction_id.expect("at least one batch was debited"),
        remaining,
        metadata: tx_metadata,
    })
}

async fn find_idempotent_transaction(
    tx: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    action_type: &str,
    idempotency_key: &str,
) -> Result<Option<(Uuid, serde_json::Value)>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, metadata FROM transactions
         WHERE user_id = $1 AND action_type = $2 AND metadata->>'idempotency_key' = $3
         ORDER BY created_at ASC LIMIT 1",
    )
    .bind(user_id)
    .bind(action_type)
    .bind(idempotency_key)
    .fetch_optional(&mut **tx)
    .await
}

async fn balance_in_tx(
    tx: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    product_key: &str,
    now: DateTime<Utc>,
) -> Result<Decimal, sqlx::Error> {
    let total: Option<i64> = sqlx::query_scalar(
        "SELECT SUM(qb.remaining_quantity) FROM quota_batches qb
         JOIN products p ON p.id = qb.product_id
         WHERE qb.user_id = $1 AND UPPER(p.product_key) = $2 AND qb.state = 'active'
           AND (qb.expires_at IS NULL OR qb.expires_at > $3)",
    )
    .bind(user_id)
    .bind(product_key)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;

    Ok(Decimal::from(total.unwrap_or(0)))
}

/// `GET_BALANCE`.
pub async fn get_balance(pool: &PgPool, user_id: Uuid, product_key: &str) -> Result<Decimal, sqlx::Error> {
    let product_key = catalog::normalize_key(product_key);
    let now = Utc::now();
    let total: Option<i64> = sqlx::query_scalar(
        "SELECT SUM(qb.remaining_quantity) FROM quota_batches qb
         JOIN products p ON p.id = qb.product_id
         WHERE qb.user_id = $1 AND UPPER(p.product_key) = $2 AND qb.state = 'active'
           AND (qb.expires_at IS NULL OR qb.expires_at > $3)",
    )
    .bind(user_id)
    .bind(&product_key)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(Decimal::from(total.unwrap_or(0)))
}

/// `GET_WALLET`.
pub async fn get_wallet(pool: &PgPool, user_id: Uuid) -> Result<HashMap<String, Decimal>, sqlx::Error> {
    let now = Utc::now();
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT p.product_key, SUM(qb.remaining_quantity) FROM quota_batches qb
         JOIN products p ON p.id = qb.product_id
         WHERE qb.user_id = $1 AND qb.state = 'active'
           AND (qb.expires_at IS NULL OR qb.expires_at > $2)
           AND p.product_key IS NOT NULL
         GROUP BY p.product_key",
    )
    .bind(user_id)
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(k, v)| (k, Decimal::from(v))).collect())
}

/// A `QuotaBatch` joined with its product's key, for wallet/batch listings
/// that need to report `product_key` alongside the batch itself.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActiveBatchRow {
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
    pub product_key: Option<String>,
}

/// Active, non-expired batches for a user (optionally filtered by product).
pub async fn list_active_batches(
    pool: &PgPool,
    user_id: Uuid,
    product_key: Option<&str>,
) -> Result<Vec<ActiveBatchRow>, sqlx::Error> {
    let now = Utc::now();
    match product_key {
        Some(pk) => {
            let pk = catalog::normalize_key(pk);
            sqlx::query_as(
                "SELECT qb.*, p.product_key FROM quota_batches qb
                 JOIN products p ON p.id = qb.product_id
                 WHERE qb.user_id = $1 AND UPPER(p.product_key) = $2 AND qb.state = 'active'
                   AND (qb.expires_at IS NULL OR qb.expires_at > $3)
                 ORDER BY qb.created_at ASC",
            )
            .bind(user_id)
            .bind(pk)
            .bind(now)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as(
                "SELECT qb.*, p.product_key FROM quota_batches qb
                 JOIN products p ON p.id = qb.product_id
                 WHERE qb.user_id = $1 AND qb.state = 'active'
                   AND (qb.expires_at IS NULL OR qb.expires_at > $2)
                 ORDER BY qb.created_at ASC",
            )
            .bind(user_id)
            .bind(now)
            .fetch_all(pool)
            .await
        }
    }
}

/// `EXPIRE`, the background sweeper's unit of work. Also runs implicitly at
/// read time via the `expires_at` filter every query above applies.
pub async fn expire_sweep(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE quota_batches SET state = 'expired', remaining_quantity = 0
         WHERE state = 'active' AND expires_at IS NOT NULL AND expires_at <= NOW()",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// REVOKE, run in its own transaction.
pub async fn revoke(
    pool: &PgPool,
    bus: &EventBus,
    order_id: Uuid,
    reason: &str,
) -> Result<(), LedgerError> {
    let mut tx = pool.begin().await?;
    let events = revoke_in_tx(&mut tx, order_id, reason).await?;
    tx.commit().await?;
    for event in events {
        bus.publish(event);
    }
    Ok(())
}

pub async fn revoke_in_tx(
    tx: &mut SqlxTransaction<'_, Postgres>,
    order_id: Uuid,
    reason: &str,
) -> Result<Vec<DomainEvent>, LedgerError> {
    let batches: Vec<QuotaBatch> = sqlx::query_as(
        "SELECT qb.* FROM quota_batches qb
         JOIN order_items oi ON oi.id = qb.order_item_id
         WHERE oi.order_id = $1 AND qb.state = 'active'
         FOR UPDATE OF qb",
    )
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut events = Vec::new();

    for batch in &batches {
        if batch.remaining_quantity > 0 {
            let transaction_id: Uuid = sqlx::query_scalar(
                "INSERT INTO transactions
                    (id, user_id, quota_batch_id, amount, direction, action_type, metadata)
                 VALUES ($1, $2, $3, $4, 'debit', $5, '{}'::jsonb)
                 RETURNING id",
            )
            .bind(Uuid::now_v7())
            .bind(batch.user_id)
            .bind(batch.id)
            .bind(Decimal::from(batch.remaining_quantity))
            .bind(reason)
            .fetch_one(&mut **tx)
            .await?;

            events.push(DomainEvent::TransactionCreated {
                transaction_id,
                user_id: batch.user_id,
                quota_batch_id: batch.id,
                direction: TransactionDirection::Debit,
                amount: Decimal::from(batch.remaining_quantity),
                action_type: reason.to_string(),
            });
        }

        sqlx::query("UPDATE quota_batches SET remaining_quantity = 0, state = 'revoked' WHERE id = $1")
            .bind(batch.id)
            .execute(&mut **tx)
            .await?;
    }

    Ok(events)
}

/// EXCHANGE: CONSUME the currency product, then GRANT the offer, in one
/// transaction. If CONSUME fails, the whole exchange aborts.
pub async fn exchange(
    pool: &PgPool,
    bus: &EventBus,
    user_id: Uuid,
    offer: &Offer,
    items: &[OfferItem],
    metadata: Option<serde_json::Value>,
) -> Result<Vec<QuotaBatch>, LedgerError> {
    let currency_product: Product = sqlx::query_as("SELECT * FROM products WHERE UPPER(product_key) = $1")
        .bind(catalog::normalize_key(&offer.currency))
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("currency product {} not found", offer.currency)))?;

    if !currency_product.is_currency {
        return Err(LedgerError::State(format!(
            "product {} is not marked as currency",
            offer.currency
        )));
    }

    let amount = offer
        .price
        .trunc()
        .to_i64()
        .ok_or_else(|| LedgerError::Validation("offer price does not fit an exchange amount".to_string()))?;

    let mut tx = pool.begin().await?;
    let now = Utc::now();

    let product_key = catalog::normalize_key(&offer.currency);
    let batches: Vec<QuotaBatch> = sqlx::query_as(
        "SELECT qb.* FROM quota_batches qb
         JOIN products p ON p.id = qb.product_id
         WHERE qb.user_id = $1 AND UPPER(p.product_key) = $2 AND qb.state = 'active'
           AND (qb.expires_at IS NULL OR qb.expires_at > $3)
         ORDER BY qb.created_at ASC, qb.id ASC
         FOR UPDATE OF qb",
    )
    .bind(user_id)
    .bind(&product_key)
    .bind(now)
    .fetch_all(&mut *tx)
    .await?;

    let total_available: i64 = batches.iter().map(|b| b.remaining_quantity).sum();
    if total_available == 0 {
        return Err(LedgerError::QuotaExhausted {
            message: format!("No active quota for {product_key}"),
        });
    }
    if total_available < amount {
        return Err(LedgerError::InsufficientFunds {
            message: "Insufficient balance".to_string(),
        });
    }

    let mut events = Vec::new();

    for allocation in allocate_fifo(&batches, amount) {
        sqlx::query("UPDATE quota_batches SET remaining_quantity = $1, state = $2 WHERE id = $3")
            .bind(allocation.new_remaining)
            .bind(allocation.new_state)
            .bind(allocation.batch_id)
            .execute(&mut *tx)
            .await?;

        let transaction_id: Uuid = sqlx::query_scalar(
            "INSERT INTO transactions
                (id, user_id, quota_batch_id, amount, direction, action_type, metadata)
             VALUES ($1, $2, $3, $4, 'debit', 'exchange', '{}'::jsonb)
             RETURNING id",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(allocation.batch_id)
        .bind(Decimal::from(allocation.take))
        .fetch_one(&mut *tx)
        .await?;

        events.push(DomainEvent::TransactionCreated {
            transaction_id,
            user_id,
            quota_batch_id: allocation.batch_id,
            direction: TransactionDirection::Debit,
            amount: Decimal::from(allocation.take),
            action_type: "exchange".to_string(),
        });
    }

    let (granted, grant_events) = grant_in_tx(
        &mut tx,
        now,
        user_id,
        Some(offer.id),
        items,
        1,
        "exchange",
        None,
        metadata,
    )
    .await?;
    events.extend(grant_events);

    tx.commit().await?;
    for event in events {
        bus.publish(event);
    }

    Ok(granted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(remaining: i64) -> QuotaBatch {
        let now = Utc::now();
        QuotaBatch {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            product_id: Uuid::now_v7(),
            source_offer_id: None,
            order_item_id: None,
            initial_quantity: remaining,
            remaining_quantity: remaining,
            valid_from: now,
            expires_at: None,
            state: BatchState::Active,
            created_at: now,
        }
    }

    /// Scenario 1 (§8): three ACTIVE batches of 10 each; 25 consumed one
    /// unit at a time nets the same split as one 25-unit consume — the
    /// first two batches exhausted, the third left with 5.
    #[test]
    fn fifo_allocation_exhausts_oldest_batches_first() {
        let batches = vec![batch(10), batch(10), batch(10)];
        let allocations = allocate_fifo(&batches, 25);

        assert_eq!(allocations.len(), 3);
        assert_eq!(allocations[0].take, 10);
        assert_eq!(allocations[0].new_remaining, 0);
        assert_eq!(allocations[0].new_state, BatchState::Exhausted);
        assert_eq!(allocations[1].take, 10);
        assert_eq!(allocations[1].new_remaining, 0);
        assert_eq!(allocations[1].new_state, BatchState::Exhausted);
        assert_eq!(allocations[2].take, 5);
        assert_eq!(allocations[2].new_remaining, 5);
        assert_eq!(allocations[2].new_state, BatchState::Active);
    }

    /// Boundary behavior (§8): two batches of (5, 5); consuming 7 debits 5
    /// from the older and 2 from the newer, and the older becomes EXHAUSTED.
    #[test]
    fn fifo_allocation_splits_across_two_batches() {
        let batches = vec![batch(5), batch(5)];
        let allocations = allocate_fifo(&batches, 7);

        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].take, 5);
        assert_eq!(allocations[0].new_state, BatchState::Exhausted);
        assert_eq!(allocations[1].take, 2);
        assert_eq!(allocations[1].new_remaining, 3);
        assert_eq!(allocations[1].new_state, BatchState::Active);
    }

    /// Boundary behavior (§8): consuming exactly the remaining amount
    /// exhausts the batch.
    #[test]
    fn fifo_allocation_exact_consumption_exhausts_batch() {
        let batches = vec![batch(10)];
        let allocations = allocate_fifo(&batches, 10);

        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].new_remaining, 0);
        assert_eq!(allocations[0].new_state, BatchState::Exhausted);
    }

    /// The walk stops as soon as `amount` is satisfied; later batches are
    /// left untouched (no zero-take allocations are emitted).
    #[test]
    fn fifo_allocation_stops_once_satisfied() {
        let batches = vec![batch(10), batch(10)];
        let allocations = allocate_fifo(&batches, 3);

        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].take, 3);
        assert_eq!(allocations[0].new_remaining, 7);
        assert_eq!(allocations[0].new_state, BatchState::Active);
    }
}
