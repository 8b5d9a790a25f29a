//! Turn repository. Turns are append-only except for the rewind suffix
//! delete; their auto-incrementing id is the causal order within a campaign.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::TurnRow;

pub struct TurnRepo<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> TurnRepo<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Appends a turn and returns its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn append(
        &mut self,
        campaign_id: Uuid,
        session_id: Option<Uuid>,
        actor_id: Option<Uuid>,
        kind: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO turns (campaign_id, session_id, actor_id, kind, content, meta_json, created_at)
             VALUES (?, ?, ?, ?, ?, '{}', ?)
             RETURNING id",
        )
        .bind(campaign_id)
        .bind(session_id)
        .bind(actor_id)
        .bind(kind)
        .bind(content)
        .bind(now)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get(&mut self, turn_id: i64) -> Result<Option<TurnRow>, StoreError> {
        let row = sqlx::query_as::<_, TurnRow>("SELECT * FROM turns WHERE id = ?")
            .bind(turn_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// The most recent `limit` turns of a campaign, returned oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn recent(
        &mut self,
        campaign_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TurnRow>, StoreError> {
        let mut rows = sqlx::query_as::<_, TurnRow>(
            "SELECT * FROM turns WHERE campaign_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(campaign_id)
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await?;
        rows.reverse();
        Ok(rows)
    }

    /// Deletes the history suffix strictly after `turn_id`. Returns the
    /// number of turns removed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn delete_after(
        &mut self,
        campaign_id: Uuid,
        turn_id: i64,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM turns WHERE campaign_id = ? AND id > ?")
            .bind(campaign_id)
            .bind(turn_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Resolves an external surface message to a turn id, preferring the
    /// narration message binding and falling back to the user one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn find_by_external_message(
        &mut self,
        campaign_id: Uuid,
        message_id: &str,
    ) -> Result<Option<i64>, StoreError> {
        let by_message = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM turns WHERE campaign_id = ? AND external_message_id = ? LIMIT 1",
        )
        .bind(campaign_id)
        .bind(message_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        if by_message.is_some() {
            return Ok(by_message);
        }

        let by_user_message = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM turns WHERE campaign_id = ? AND external_user_message_id = ? LIMIT 1",
        )
        .bind(campaign_id)
        .bind(message_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(by_user_message)
    }

    /// Records the surface message ids once the chat layer has posted a
    /// turn.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn bind_external_messages(
        &mut self,
        turn_id: i64,
        external_message_id: Option<&str>,
        external_user_message_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE turns SET external_message_id = ?, external_user_message_id = ? WHERE id = ?",
        )
        .bind(external_message_id)
        .bind(external_user_message_id)
        .bind(turn_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn count_by_campaign(&mut self, campaign_id: Uuid) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM turns WHERE campaign_id = ?",
        )
        .bind(campaign_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(count)
    }
}
