//! Player repository.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::PlayerRow;

pub struct PlayerRepo<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> PlayerRepo<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get(
        &mut self,
        campaign_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Option<PlayerRow>, StoreError> {
        let row = sqlx::query_as::<_, PlayerRow>(
            "SELECT * FROM players WHERE campaign_id = ? AND actor_id = ?",
        )
        .bind(campaign_id)
        .bind(actor_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(row)
    }

    /// Creates a level-1 player with empty state.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure, including a violation of
    /// the `(campaign_id, actor_id)` uniqueness key.
    pub async fn create(
        &mut self,
        campaign_id: Uuid,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PlayerRow, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO players
                 (id, campaign_id, actor_id, level, xp, attributes_json, state_json,
                  created_at, updated_at)
             VALUES (?, ?, ?, 1, 0, '{}', '{}', ?, ?)",
        )
        .bind(id)
        .bind(campaign_id)
        .bind(actor_id)
        .bind(now)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(PlayerRow {
            id,
            campaign_id,
            actor_id,
            level: 1,
            xp: 0,
            attributes_json: "{}".to_owned(),
            state_json: "{}".to_owned(),
            last_active_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetches the player for `(campaign, actor)` or creates one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get_or_create(
        &mut self,
        campaign_id: Uuid,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PlayerRow, StoreError> {
        if let Some(existing) = self.get(campaign_id, actor_id).await? {
            return Ok(existing);
        }
        self.create(campaign_id, actor_id, now).await
    }

    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn list_by_campaign(
        &mut self,
        campaign_id: Uuid,
    ) -> Result<Vec<PlayerRow>, StoreError> {
        let rows = sqlx::query_as::<_, PlayerRow>(
            "SELECT * FROM players WHERE campaign_id = ? ORDER BY created_at ASC",
        )
        .bind(campaign_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }

    /// Phase-C update for the acting player: new xp, new state, activity
    /// timestamps.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn update_progress(
        &mut self,
        player_id: Uuid,
        xp: i64,
        state_json: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE players
             SET xp = ?, state_json = ?, last_active_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(xp)
        .bind(state_json)
        .bind(now)
        .bind(now)
        .bind(player_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Replaces only the state blob; used when an item transfer touches a
    /// player other than the acting one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn set_state(
        &mut self,
        player_id: Uuid,
        state_json: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE players SET state_json = ?, updated_at = ? WHERE id = ?",
        )
        .bind(state_json)
        .bind(now)
        .bind(player_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Rewind restore of a player's projected state.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn restore(
        &mut self,
        player_id: Uuid,
        level: i64,
        xp: i64,
        attributes_json: &str,
        state_json: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE players
             SET level = ?, xp = ?, attributes_json = ?, state_json = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(level)
        .bind(xp)
        .bind(attributes_json)
        .bind(state_json)
        .bind(now)
        .bind(player_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
