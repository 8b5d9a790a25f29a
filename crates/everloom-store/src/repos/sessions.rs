//! Session repository. The turn engine only ever reads these; the chat
//! layer registers them.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::SessionRow;

pub struct SessionRepo<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> SessionRepo<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get(&mut self, id: Uuid) -> Result<Option<SessionRow>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get_by_surface_key(
        &mut self,
        surface_key: &str,
    ) -> Result<Option<SessionRow>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE surface_key = ?")
            .bind(surface_key)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Fetches the session bound to `surface_key` or registers it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get_or_create(
        &mut self,
        campaign_id: Uuid,
        surface: &str,
        surface_key: &str,
        surface_channel_id: Option<&str>,
        surface_thread_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SessionRow, StoreError> {
        if let Some(existing) = self.get_by_surface_key(surface_key).await? {
            return Ok(existing);
        }

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO sessions
                 (id, campaign_id, surface, surface_key, surface_channel_id,
                  surface_thread_id, enabled, metadata_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 1, '{}', ?, ?)",
        )
        .bind(id)
        .bind(campaign_id)
        .bind(surface)
        .bind(surface_key)
        .bind(surface_channel_id)
        .bind(surface_thread_id)
        .bind(now)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(SessionRow {
            id,
            campaign_id,
            surface: surface.to_owned(),
            surface_key: surface_key.to_owned(),
            surface_channel_id: surface_channel_id.map(str::to_owned),
            surface_thread_id: surface_thread_id.map(str::to_owned),
            enabled: true,
            metadata_json: "{}".to_owned(),
            created_at: now,
            updated_at: now,
        })
    }
}
