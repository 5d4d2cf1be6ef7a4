//! In-process domain event bus.
//!
//! The source system publishes events through Django signals; here that
//! becomes a synchronous publish over a `tokio::sync::broadcast` channel,
//! fired only after the enclosing transaction commits (§5, §9). Subscribers
//! receive an owned snapshot and must not be able to reach back into the
//! ledger through it — they enqueue further work instead.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    OrderConfirmed {
        order_id: Uuid,
        user_id: Uuid,
        paid_at: DateTime<Utc>,
    },
    TransactionCreated {
        transaction_id: Uuid,
        user_id: Uuid,
        quota_batch_id: Uuid,
        direction: crate::models::TransactionDirection,
        amount: Decimal,
        action_type: String,
    },
    QuotaConsumed {
        user_id: Uuid,
        product_key: String,
        amount: Decimal,
        action_type: String,
    },
    TrialActivated {
        user_id: Uuid,
        trial_plan_name: String,
    },
    ReferralAttached {
        referral_id: Uuid,
        referrer_id: Uuid,
        referee_id: Uuid,
    },
    CustomersMerged {
        target_user_id: Uuid,
        source_user_id: Uuid,
    },
}

/// Handle for publishing and subscribing to domain events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish after the enclosing `sqlx::Transaction` has committed.
    pub fn publish(&self, event: DomainEvent) {
        // No receivers is a normal state (e.g. in tests); broadcast::Sender
        // returns Err in that case, which is not a failure for the caller.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Default subscriber: logs every event. Spawned once at startup; real
/// deployments would add further subscribers (referral-bonus computation,
/// notification dispatch) without ever touching ledger state directly.
pub fn spawn_logging_subscriber(bus: &EventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::info!(?event, "domain event"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("event subscriber lagged by {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
