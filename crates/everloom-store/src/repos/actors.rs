//! Actor repository.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::ActorRow;

pub struct ActorRepo<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> ActorRepo<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Creates an actor with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn create(
        &mut self,
        display_name: Option<&str>,
        kind: &str,
        now: DateTime<Utc>,
    ) -> Result<ActorRow, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO actors (id, display_name, kind, metadata_json, created_at, updated_at)
             VALUES (?, ?, ?, '{}', ?, ?)",
        )
        .bind(id)
        .bind(display_name)
        .bind(kind)
        .bind(now)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(ActorRow {
            id,
            display_name: display_name.map(str::to_owned),
            kind: kind.to_owned(),
            metadata_json: "{}".to_owned(),
            created_at: now,
            updated_at: now,
        })
    }

    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get(&mut self, id: Uuid) -> Result<Option<ActorRow>, StoreError> {
        let row = sqlx::query_as::<_, ActorRow>("SELECT * FROM actors WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }
}
