//! Outbox dispatcher.
//!
//! Phase C and the rewind controller only ever write `pending` rows; this
//! worker drains them. Delivery goes through the [`OutboxDelivery`] port;
//! a failed attempt is rescheduled with exponential backoff until the
//! attempt budget is exhausted, at which point the row is marked `failed`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;

use everloom_core::clock::Clock;
use everloom_core::error::PortError;
use everloom_store::models::OutboxEventRow;
use everloom_store::Store;

use crate::error::EngineError;

/// Consumer side of the outbox: routes one event to wherever it must go
/// (chat surface, media generation, memory index).
#[async_trait]
pub trait OutboxDelivery: Send + Sync {
    async fn deliver(&self, event: &OutboxEventRow) -> Result<(), PortError>;
}

/// Dispatcher tunables.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Events fetched per drain.
    pub batch_size: i64,
    /// Attempts before a row is marked `failed`.
    pub max_attempts: i64,
    /// First retry delay; doubles per subsequent attempt.
    pub base_backoff_seconds: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_attempts: 5,
            base_backoff_seconds: 30,
        }
    }
}

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub delivered: u32,
    pub retried: u32,
    pub failed: u32,
}

/// Drains pending outbox rows through a delivery port.
pub struct OutboxDispatcher {
    store: Store,
    delivery: Arc<dyn OutboxDelivery>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
}

impl OutboxDispatcher {
    /// Creates a dispatcher over `store` delivering through `delivery`.
    #[must_use]
    pub fn new(
        store: Store,
        delivery: Arc<dyn OutboxDelivery>,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            delivery,
            clock,
            config,
        }
    }

    /// One drain pass over the due pending rows.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on database failure. Delivery failures do not
    /// abort the pass; they reschedule or fail the individual row.
    pub async fn drain_once(&self) -> Result<DrainReport, EngineError> {
        let now = self.clock.now();
        let mut report = DrainReport::default();

        let mut tx = self.store.begin().await?;
        let batch = tx.outbox().due_pending(now, self.config.batch_size).await?;
        tx.rollback().await?;

        for event in batch {
            match self.delivery.deliver(&event).await {
                Ok(()) => {
                    let mut tx = self.store.begin().await?;
                    tx.outbox().mark_sent(event.id, self.clock.now()).await?;
                    tx.commit().await?;
                    report.delivered += 1;
                }
                Err(err) => {
                    let attempts = event.attempts + 1;
                    let mut tx = self.store.begin().await?;
                    if attempts >= self.config.max_attempts {
                        tx.outbox().mark_failed(event.id, attempts, now).await?;
                        report.failed += 1;
                        tracing::warn!(
                            event_id = %event.id,
                            event_type = %event.event_type,
                            attempts,
                            error = %err,
                            "outbox event failed permanently"
                        );
                    } else {
                        let backoff = self.config.base_backoff_seconds << (attempts - 1).min(16);
                        tx.outbox()
                            .reschedule(
                                event.id,
                                attempts,
                                now + Duration::seconds(backoff),
                                now,
                            )
                            .await?;
                        report.retried += 1;
                        tracing::warn!(
                            event_id = %event.id,
                            event_type = %event.event_type,
                            attempts,
                            backoff_seconds = backoff,
                            error = %err,
                            "outbox delivery failed; rescheduled"
                        );
                    }
                    tx.commit().await?;
                }
            }
        }

        if report.delivered > 0 || report.retried > 0 || report.failed > 0 {
            tracing::info!(
                delivered = report.delivered,
                retried = report.retried,
                failed = report.failed,
                "outbox drain"
            );
        }
        Ok(report)
    }
}
