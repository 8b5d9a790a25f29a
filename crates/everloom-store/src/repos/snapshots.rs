//! Snapshot repository. One snapshot per narration turn, enforced by the
//! unique constraint on `turn_id`.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::SnapshotRow;

pub struct SnapshotRepo<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> SnapshotRepo<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Writes the snapshot for a narration turn.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure, including a second
    /// snapshot for the same turn.
    #[allow(clippy::too_many_arguments)]
    pub async fn add(
        &mut self,
        turn_id: i64,
        campaign_id: Uuid,
        campaign_state_json: &str,
        campaign_characters_json: &str,
        campaign_summary: &str,
        campaign_last_narration: Option<&str>,
        players_json: &str,
        now: DateTime<Utc>,
    ) -> Result<SnapshotRow, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO snapshots
                 (id, turn_id, campaign_id, campaign_state_json, campaign_characters_json,
                  campaign_summary, campaign_last_narration, players_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(turn_id)
        .bind(campaign_id)
        .bind(campaign_state_json)
        .bind(campaign_characters_json)
        .bind(campaign_summary)
        .bind(campaign_last_narration)
        .bind(players_json)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(SnapshotRow {
            id,
            turn_id,
            campaign_id,
            campaign_state_json: campaign_state_json.to_owned(),
            campaign_characters_json: campaign_characters_json.to_owned(),
            campaign_summary: campaign_summary.to_owned(),
            campaign_last_narration: campaign_last_narration.map(str::to_owned),
            players_json: players_json.to_owned(),
            created_at: now,
        })
    }

    /// The snapshot bound to `turn_id`, scoped to the campaign so a rewind
    /// cannot restore another campaign's state.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get_by_campaign_turn(
        &mut self,
        campaign_id: Uuid,
        turn_id: i64,
    ) -> Result<Option<SnapshotRow>, StoreError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM snapshots WHERE campaign_id = ? AND turn_id = ?",
        )
        .bind(campaign_id)
        .bind(turn_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(row)
    }

    /// Deletes snapshots attached to turns strictly after `turn_id`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn delete_after(
        &mut self,
        campaign_id: Uuid,
        turn_id: i64,
    ) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM snapshots WHERE campaign_id = ? AND turn_id > ?")
                .bind(campaign_id)
                .bind(turn_id)
                .execute(&mut *self.conn)
                .await?;
        Ok(result.rows_affected())
    }

    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn count_by_campaign(&mut self, campaign_id: Uuid) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM snapshots WHERE campaign_id = ?",
        )
        .bind(campaign_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(count)
    }
}
