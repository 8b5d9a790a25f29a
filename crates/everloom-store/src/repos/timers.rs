//! Timer repository.
//!
//! Every transition is a conditional update guarded on the current status,
//! so re-applying a transition from a terminal or matching state touches
//! zero rows and reads as a no-op.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::TimerRow;

const ACTIVE: &str = "('scheduled_unbound', 'scheduled_bound')";

pub struct TimerRepo<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> TimerRepo<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get(&mut self, timer_id: Uuid) -> Result<Option<TimerRow>, StoreError> {
        let row = sqlx::query_as::<_, TimerRow>("SELECT * FROM timers WHERE id = ?")
            .bind(timer_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// The campaign's active timer, if any. The partial unique index
    /// guarantees at most one row can match.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn active(&mut self, campaign_id: Uuid) -> Result<Option<TimerRow>, StoreError> {
        let sql = format!(
            "SELECT * FROM timers WHERE campaign_id = ? AND status IN {ACTIVE}
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, TimerRow>(&sql)
            .bind(campaign_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Inserts a new timer in `scheduled_unbound`. The caller must have
    /// cancelled any active timer in the same transaction first, or the
    /// partial unique index rejects the insert.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn schedule(
        &mut self,
        campaign_id: Uuid,
        session_id: Option<Uuid>,
        due_at: DateTime<Utc>,
        event_text: &str,
        interruptible: bool,
        interrupt_action: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TimerRow, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO timers
                 (id, campaign_id, session_id, status, event_text, interruptible,
                  interrupt_action, due_at, created_at, updated_at)
             VALUES (?, ?, ?, 'scheduled_unbound', ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(campaign_id)
        .bind(session_id)
        .bind(event_text)
        .bind(interruptible)
        .bind(interrupt_action)
        .bind(due_at)
        .bind(now)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(TimerRow {
            id,
            campaign_id,
            session_id,
            status: "scheduled_unbound".to_owned(),
            event_text: event_text.to_owned(),
            interruptible,
            interrupt_action: interrupt_action.map(str::to_owned),
            due_at,
            fired_at: None,
            cancelled_at: None,
            external_message_id: None,
            external_channel_id: None,
            external_thread_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// `scheduled_unbound` → `scheduled_bound`. Binding an already-bound or
    /// finished timer is a no-op and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn attach_message(
        &mut self,
        timer_id: Uuid,
        external_message_id: &str,
        external_channel_id: Option<&str>,
        external_thread_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE timers
             SET status = 'scheduled_bound', external_message_id = ?,
                 external_channel_id = ?, external_thread_id = ?, updated_at = ?
             WHERE id = ? AND status = 'scheduled_unbound'",
        )
        .bind(external_message_id)
        .bind(external_channel_id)
        .bind(external_thread_id)
        .bind(now)
        .bind(timer_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Cancels whatever timer is active for the campaign. Returns the
    /// number of rows moved to `cancelled` (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn cancel_active(
        &mut self,
        campaign_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE timers SET status = 'cancelled', cancelled_at = ?, updated_at = ?
             WHERE campaign_id = ? AND status IN {ACTIVE}"
        );
        let result = sqlx::query(&sql)
            .bind(now)
            .bind(now)
            .bind(campaign_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Active → `expired`; records the firing time.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn mark_expired(
        &mut self,
        timer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE timers SET status = 'expired', fired_at = ?, updated_at = ?
             WHERE id = ? AND status IN {ACTIVE}"
        );
        let result = sqlx::query(&sql)
            .bind(now)
            .bind(now)
            .bind(timer_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `expired` → `consumed`, once the effects port has run.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn mark_consumed(
        &mut self,
        timer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE timers SET status = 'consumed', updated_at = ?
             WHERE id = ? AND status = 'expired'",
        )
        .bind(now)
        .bind(timer_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Active timers whose `due_at` has passed, across campaigns, oldest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn due(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TimerRow>, StoreError> {
        let sql = format!(
            "SELECT * FROM timers WHERE status IN {ACTIVE} AND due_at <= ?
             ORDER BY due_at ASC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, TimerRow>(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(rows)
    }

    /// Timers stuck in `expired` whose effects have not been applied yet.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn expired_unconsumed(&mut self, limit: i64) -> Result<Vec<TimerRow>, StoreError> {
        let rows = sqlx::query_as::<_, TimerRow>(
            "SELECT * FROM timers WHERE status = 'expired' ORDER BY fired_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }
}
