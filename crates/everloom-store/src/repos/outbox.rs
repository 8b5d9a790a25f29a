//! Outbox repository.
//!
//! Inserts are idempotent under the `(campaign_id, session_scope,
//! event_type, idempotency_key)` key; the dispatcher side transitions rows
//! to `sent` or reschedules them with backoff.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::OutboxEventRow;

/// Scope value used when an event has no surface session.
pub const NO_SESSION_SCOPE: &str = "__none__";

pub struct OutboxRepo<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> OutboxRepo<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Appends a pending event. A duplicate under the idempotency key is
    /// silently skipped; the return value says whether a row was inserted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn add(
        &mut self,
        campaign_id: Uuid,
        session_id: Option<Uuid>,
        event_type: &str,
        idempotency_key: &str,
        payload_json: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let session_scope = session_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| NO_SESSION_SCOPE.to_owned());
        let result = sqlx::query(
            "INSERT INTO outbox_events
                 (id, campaign_id, session_id, session_scope, event_type, idempotency_key,
                  payload_json, status, attempts, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?)
             ON CONFLICT (campaign_id, session_scope, event_type, idempotency_key) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(campaign_id)
        .bind(session_id)
        .bind(session_scope)
        .bind(event_type)
        .bind(idempotency_key)
        .bind(payload_json)
        .bind(now)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Pending events that are due for a delivery attempt, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn due_pending(
        &mut self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxEventRow>, StoreError> {
        let rows = sqlx::query_as::<_, OutboxEventRow>(
            "SELECT * FROM outbox_events
             WHERE status = 'pending' AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
             ORDER BY created_at ASC LIMIT ?",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }

    /// `pending` → `sent`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn mark_sent(
        &mut self,
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE outbox_events SET status = 'sent', updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(now)
        .bind(event_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Keeps the event pending but pushes its next attempt into the future.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn reschedule(
        &mut self,
        event_id: Uuid,
        attempts: i64,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE outbox_events SET attempts = ?, next_attempt_at = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(attempts)
        .bind(next_attempt_at)
        .bind(now)
        .bind(event_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `pending` → `failed`, once the attempt budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn mark_failed(
        &mut self,
        event_id: Uuid,
        attempts: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE outbox_events SET status = 'failed', attempts = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(attempts)
        .bind(now)
        .bind(event_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// All events of a campaign, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn list_by_campaign(
        &mut self,
        campaign_id: Uuid,
    ) -> Result<Vec<OutboxEventRow>, StoreError> {
        let rows = sqlx::query_as::<_, OutboxEventRow>(
            "SELECT * FROM outbox_events WHERE campaign_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(campaign_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }
}
