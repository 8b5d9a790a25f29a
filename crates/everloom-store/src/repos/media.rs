//! Media-reference repository. Rows are written by outbox consumers after
//! the media-generation port returns a URL.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::MediaRefRow;

pub struct MediaRepo<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> MediaRepo<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Records a generated media reference.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn add(
        &mut self,
        campaign_id: Uuid,
        player_id: Option<Uuid>,
        ref_type: &str,
        room_key: Option<&str>,
        url: &str,
        prompt: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<MediaRefRow, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO media_refs
                 (id, campaign_id, player_id, ref_type, room_key, url, prompt,
                  metadata_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, '{}', ?, ?)",
        )
        .bind(id)
        .bind(campaign_id)
        .bind(player_id)
        .bind(ref_type)
        .bind(room_key)
        .bind(url)
        .bind(prompt)
        .bind(now)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(MediaRefRow {
            id,
            campaign_id,
            player_id,
            ref_type: ref_type.to_owned(),
            room_key: room_key.map(str::to_owned),
            url: url.to_owned(),
            prompt: prompt.map(str::to_owned),
            metadata_json: "{}".to_owned(),
            created_at: now,
            updated_at: now,
        })
    }

    /// The most recent media generated for a room.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn latest_for_room(
        &mut self,
        campaign_id: Uuid,
        room_key: &str,
    ) -> Result<Option<MediaRefRow>, StoreError> {
        let row = sqlx::query_as::<_, MediaRefRow>(
            "SELECT * FROM media_refs WHERE campaign_id = ? AND room_key = ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(campaign_id)
        .bind(room_key)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(row)
    }
}
