//! Timer binding and the expiry worker.
//!
//! The engine schedules and cancels timers inside Phase C; everything after
//! `due_at` passes happens here. The worker polls due timers, marks them
//! `expired`, applies their narrative effect through the `TimerEffects`
//! port, and marks them `consumed`. A failed effects call leaves the timer
//! in `expired` so the next sweep retries it.

use std::sync::Arc;

use uuid::Uuid;

use everloom_core::clock::Clock;
use everloom_core::ports::TimerEffects;
use everloom_core::types::ExpiredTimer;
use everloom_store::models::TimerRow;
use everloom_store::Store;

use crate::engine::TurnEngine;
use crate::error::EngineError;

impl TurnEngine {
    /// Binds the campaign's active timer to an already-sent surface
    /// message. Returns `false` when there is no active timer or it is
    /// already bound; both are no-ops.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on database failure.
    pub async fn attach_timer_message(
        &self,
        campaign_id: Uuid,
        external_message_id: &str,
        external_channel_id: Option<&str>,
        external_thread_id: Option<&str>,
    ) -> Result<bool, EngineError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let Some(timer) = tx.timers().active(campaign_id).await? else {
            tx.rollback().await?;
            return Ok(false);
        };
        let bound = tx
            .timers()
            .attach_message(
                timer.id,
                external_message_id,
                external_channel_id,
                external_thread_id,
                now,
            )
            .await?;
        tx.commit().await?;
        Ok(bound)
    }

    /// Cancels the campaign's active timer, if any.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on database failure.
    pub async fn cancel_timer(&self, campaign_id: Uuid) -> Result<bool, EngineError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let cancelled = tx.timers().cancel_active(campaign_id, now).await?;
        tx.commit().await?;
        Ok(cancelled == 1)
    }
}

/// Counts from one expiry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerSweep {
    /// Active timers whose `due_at` passed and were marked `expired`.
    pub expired: u32,
    /// Expired timers whose effects ran and were marked `consumed`.
    pub consumed: u32,
}

/// Polls `due_at` and drives expired timers through the effects port.
pub struct TimerWorker {
    store: Store,
    effects: Arc<dyn TimerEffects>,
    clock: Arc<dyn Clock>,
    batch_size: i64,
}

impl TimerWorker {
    /// Creates a worker over `store` applying effects through `effects`.
    #[must_use]
    pub fn new(store: Store, effects: Arc<dyn TimerEffects>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            effects,
            clock,
            batch_size: 16,
        }
    }

    /// One sweep: expire due timers, then consume whatever sits in
    /// `expired` (including leftovers from earlier failed sweeps).
    ///
    /// # Errors
    ///
    /// Returns `Storage` on database failure. Effects-port failures are
    /// logged and leave the timer in `expired` for the next sweep.
    pub async fn run_once(&self) -> Result<TimerSweep, EngineError> {
        let now = self.clock.now();
        let mut sweep = TimerSweep::default();

        let mut tx = self.store.begin().await?;
        let due = tx.timers().due(now, self.batch_size).await?;
        for timer in &due {
            if tx.timers().mark_expired(timer.id, now).await? {
                sweep.expired += 1;
            }
        }
        tx.commit().await?;

        let mut tx = self.store.begin().await?;
        let expired = tx.timers().expired_unconsumed(self.batch_size).await?;
        tx.rollback().await?;

        for row in expired {
            let timer = expired_timer(&row);
            match self.effects.apply(&timer).await {
                Ok(()) => {
                    let mut tx = self.store.begin().await?;
                    let consumed = tx.timers().mark_consumed(row.id, self.clock.now()).await?;
                    tx.commit().await?;
                    if consumed {
                        sweep.consumed += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        timer_id = %row.id,
                        campaign_id = %row.campaign_id,
                        error = %err,
                        "timer effects failed; will retry on the next sweep"
                    );
                }
            }
        }

        if sweep.expired > 0 || sweep.consumed > 0 {
            tracing::info!(expired = sweep.expired, consumed = sweep.consumed, "timer sweep");
        }
        Ok(sweep)
    }
}

fn expired_timer(row: &TimerRow) -> ExpiredTimer {
    ExpiredTimer {
        id: row.id,
        campaign_id: row.campaign_id,
        session_id: row.session_id,
        event_text: row.event_text.clone(),
        interruptible: row.interruptible,
        interrupt_action: row.interrupt_action.clone(),
        due_at: row.due_at,
    }
}
