//! Embedding repository. Vectors are opaque blobs; the engine only ever
//! writes, counts, and prunes them.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::EmbeddingRow;

pub struct EmbeddingRepo<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> EmbeddingRepo<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Stores the vector for a turn. One embedding per turn; a duplicate is
    /// skipped and reported as `false`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn add(
        &mut self,
        turn_id: i64,
        campaign_id: Uuid,
        kind: &str,
        content: &str,
        embedding: &[u8],
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO embeddings (turn_id, campaign_id, kind, content, embedding, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (turn_id) DO NOTHING",
        )
        .bind(turn_id)
        .bind(campaign_id)
        .bind(kind)
        .bind(content)
        .bind(embedding)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get(&mut self, turn_id: i64) -> Result<Option<EmbeddingRow>, StoreError> {
        let row = sqlx::query_as::<_, EmbeddingRow>("SELECT * FROM embeddings WHERE turn_id = ?")
            .bind(turn_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Prunes embeddings for turns strictly after `turn_id`.
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
            sqlx::query("DELETE FROM embeddings WHERE campaign_id = ? AND turn_id > ?")
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
            "SELECT COUNT(*) FROM embeddings WHERE campaign_id = ?",
        )
        .bind(campaign_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(count)
    }
}
