//! Order service (§4.4): CREATE, CONFIRM, REFUND, CANCEL. Composes ledger
//! calls (GRANT, REVOKE) but never writes `QuotaBatch`/`Transaction` rows
//! itself.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{DomainEvent, EventBus};
use crate::models::{Offer, OfferItem, Order, OrderItem, OrderItemRequest, OrderStatus};
use crate::services::{catalog, ledger};

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
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

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(msg) => AppError::Validation(msg),
            OrderError::NotFound(msg) => AppError::NotFound(msg),
            OrderError::State(msg) => AppError::State(msg),
            OrderError::Ledger(e) => e.into(),
            OrderError::Database(e) => e.into(),
        }
    }
}

pub struct CreatedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// CREATE: resolves each `{sku, quantity}` to an offer, falling back to an
/// inactive offer with the same SKU so re-purchases of just-deactivated SKUs
/// still succeed if the caller already has a quote.
pub async fn create(
    pool: &PgPool,
    user_id: Uuid,
    items: &[OrderItemRequest],
    metadata: Option<serde_json::Value>,
) -> Result<CreatedOrder, OrderError> {
    if items.is_empty() {
        return Err(OrderError::Validation("items must not be empty".to_string()));
    }

    let mut resolved: Vec<(Offer, i64, Decimal)> = Vec::with_capacity(items.len());
    for item in items {
        let offer = resolve_offer_for_purchase(pool, &item.sku).await?;
        let price = item.price.unwrap_or(offer.price);
        resolved.push((offer, item.quantity, price));
    }

    let total_amount: Decimal = resolved.iter().map(|(_, qty, price)| price * Decimal::from(*qty)).sum();
    let currency = resolved
        .first()
        .map(|(offer, _, _)| offer.currency.clone())
        .unwrap_or_else(|| "USD".to_string());
    let metadata = metadata.unwrap_or(serde_json::json!({}));

    let mut tx = pool.begin().await?;

    let order: Order = sqlx::query_as(
        "INSERT INTO orders (user_id, total_amount, currency, status, metadata)
         VALUES ($1, $2, $3, 'pending', $4)
         RETURNING *",
    )
    .bind(user_id)
    .bind(total_amount)
    .bind(&currency)
    .bind(&metadata)
    .fetch_one(&mut *tx)
    .await?;

    let mut order_items = Vec::with_capacity(resolved.len());
    for (offer, quantity, price) in &resolved {
        let order_item: OrderItem = sqlx::query_as(
            "INSERT INTO order_items (order_id, offer_id, quantity, price)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(order.id)
        .bind(offer.id)
        .bind(quantity)
        .bind(price)
        .fetch_one(&mut *tx)
        .await?;
        order_items.push(order_item);
    }

    tx.commit().await?;

    Ok(CreatedOrder {
        order,
        items: order_items,
    })
}

/// Resolves an active offer by SKU; falls back to an inactive offer with the
/// same SKU so re-purchases of just-deactivated SKUs still succeed if the
/// caller already has a quote.
async fn resolve_offer_for_purchase(pool: &PgPool, sku: &str) -> Result<Offer, OrderError> {
    if let Some(offer) = catalog::get_offer_by_sku(pool, sku).await? {
        return Ok(offer);
    }
    catalog::get_offer_by_sku_any(pool, sku)
        .await?
        .ok_or_else(|| OrderError::NotFound(format!("offer {sku} not found")))
}

/// CONFIRM: idempotent on an already-PAID order (duplicate payment webhooks
/// are not an error).
pub async fn confirm(
    pool: &PgPool,
    bus: &EventBus,
    order_id: Uuid,
    payment_id: Option<String>,
    payment_method: Option<String>,
) -> Result<Order, OrderError> {
    let mut tx = pool.begin().await?;

    let order: Order = sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| OrderError::NotFound(format!("order {order_id} not found")))?;

    if order.status == OrderStatus::Paid {
        tx.commit().await?;
        return Ok(order);
    }
    if order.status != OrderStatus::Pending {
        return Err(OrderError::State(format!(
            "order {order_id} is {:?}, cannot confirm",
            order.status
        )));
    }

    let now = Utc::now();
    let paid_order: Order = sqlx::query_as(
        "UPDATE orders SET status = 'paid', paid_at = $2, payment_id = $3, payment_method = $4
         WHERE id = $1
         RETURNING *",
    )
    .bind(order_id)
    .bind(now)
    .bind(&payment_id)
    .bind(&payment_method)
    .fetch_one(&mut *tx)
    .await?;

    let order_items: Vec<OrderItem> = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1")
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

    let mut events = Vec::new();
    for order_item in &order_items {
        let offer: Offer = sqlx::query_as("SELECT * FROM offers WHERE id = $1")
            .bind(order_item.offer_id)
            .fetch_one(&mut *tx)
            .await?;
        let offer_items: Vec<OfferItem> = sqlx::query_as("SELECT * FROM offer_items WHERE offer_id = $1")
            .bind(offer.id)
            .fetch_all(&mut *tx)
            .await?;

        let (_, grant_events) = ledger::grant_in_tx(
            &mut tx,
            now,
            order.user_id,
            Some(offer.id),
            &offer_items,
            order_item.quantity,
            "purchase",
            Some(order_item.id),
            None,
        )
        .await?;
        events.extend(grant_events);
    }

    tx.commit().await?;

    bus.publish(DomainEvent::OrderConfirmed {
        order_id: paid_order.id,
        user_id: paid_order.user_id,
        paid_at: paid_order.paid_at.unwrap_or(now),
    });
    for event in events {
        bus.publish(event);
    }

    Ok(paid_order)
}

/// REFUND: PAID -> REFUNDED; revokes every still-active batch linked to the
/// order.
pub async fn refund(
    pool: &PgPool,
    bus: &EventBus,
    order_id: Uuid,
    reason: Option<String>,
) -> Result<Order, OrderError> {
    let mut tx = pool.begin().await?;

    let order: Order = sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| OrderError::NotFound(format!("order {order_id} not found")))?;

    if order.status != OrderStatus::Paid {
        return Err(OrderError::State(format!(
            "order {order_id} is {:?}, cannot refund",
            order.status
        )));
    }

    let mut metadata = match order.metadata.clone() {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    metadata.insert(
        "refund_reason".to_string(),
        serde_json::Value::String(reason.clone().unwrap_or_default()),
    );

    let refunded: Order = sqlx::query_as(
        "UPDATE orders SET status = 'refunded', metadata = $2 WHERE id = $1 RETURNING *",
    )
    .bind(order_id)
    .bind(serde_json::Value::Object(metadata))
    .fetch_one(&mut *tx)
    .await?;

    let events = ledger::revoke_in_tx(&mut tx, order_id, "refund").await?;
    tx.commit().await?;
    for event in events {
        bus.publish(event);
    }

    Ok(refunded)
}

/// CANCEL: PENDING -> CANCELLED only. Never touches the ledger.
pub async fn cancel(pool: &PgPool, order_id: Uuid) -> Result<Order, OrderError> {
    let mut tx = pool.begin().await?;

    let order: Order = sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| OrderError::NotFound(format!("order {order_id} not found")))?;

    if order.status != OrderStatus::Pending {
        return Err(OrderError::State(format!(
            "order {order_id} is {:?}, cannot cancel",
            order.status
        )));
    }

    let cancelled: Order = sqlx::query_as("UPDATE orders SET status = 'cancelled' WHERE id = $1 RETURNING *")
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(cancelled)
}

pub async fn get(pool: &PgPool, order_id: Uuid) -> Result<(Order, Vec<OrderItem>), OrderError> {
    let order: Order = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| OrderError::NotFound(format!("order {order_id} not found")))?;
    let items: Vec<OrderItem> = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1")
        .bind(order_id)
        .fetch_all(pool)
        .await?;
    Ok((order, items))
}
