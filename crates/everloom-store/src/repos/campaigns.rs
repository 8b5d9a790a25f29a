//! Campaign repository.
//!
//! The two CAS methods are the campaign's optimistic-concurrency fence:
//! both update only `WHERE row_version = expected` and bump the version by
//! exactly one, returning whether a row was touched.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use everloom_core::normalize::normalize_campaign_name;

use crate::error::StoreError;
use crate::models::CampaignRow;

pub struct CampaignRepo<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> CampaignRepo<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get(&mut self, id: Uuid) -> Result<Option<CampaignRow>, StoreError> {
        let row = sqlx::query_as::<_, CampaignRow>("SELECT * FROM campaigns WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Looks up a campaign by its uniqueness key. `name` is normalized
    /// before the comparison.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get_by_name(
        &mut self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CampaignRow>, StoreError> {
        let row = sqlx::query_as::<_, CampaignRow>(
            "SELECT * FROM campaigns WHERE namespace = ? AND name_normalized = ?",
        )
        .bind(namespace)
        .bind(normalize_campaign_name(name))
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(row)
    }

    /// Creates a campaign at `row_version = 1`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure, including a violation of
    /// the `(namespace, name_normalized)` uniqueness key.
    pub async fn create(
        &mut self,
        namespace: &str,
        name: &str,
        created_by_actor_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<CampaignRow, StoreError> {
        let id = Uuid::new_v4();
        let name_normalized = normalize_campaign_name(name);
        sqlx::query(
            "INSERT INTO campaigns
                 (id, namespace, name, name_normalized, created_by_actor_id,
                  summary, state_json, characters_json, row_version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, '', '{}', '{}', 1, ?, ?)",
        )
        .bind(id)
        .bind(namespace)
        .bind(name)
        .bind(&name_normalized)
        .bind(created_by_actor_id)
        .bind(now)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok(CampaignRow {
            id,
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            name_normalized,
            created_by_actor_id,
            summary: String::new(),
            state_json: "{}".to_owned(),
            characters_json: "{}".to_owned(),
            last_narration: None,
            memory_visible_max_turn_id: None,
            row_version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetches the campaign for `(namespace, name)` or creates it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get_or_create(
        &mut self,
        namespace: &str,
        name: &str,
        created_by_actor_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<CampaignRow, StoreError> {
        if let Some(existing) = self.get_by_name(namespace, name).await? {
            return Ok(existing);
        }
        self.create(namespace, name, created_by_actor_id, now).await
    }

    /// Phase-C commit: replaces the narrative blobs and bumps `row_version`
    /// by one, but only if the version still matches `expected_row_version`.
    /// Returns `false` on a CAS mismatch.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn commit_turn_state(
        &mut self,
        id: Uuid,
        expected_row_version: i64,
        summary: &str,
        state_json: &str,
        characters_json: &str,
        last_narration: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE campaigns
             SET summary = ?, state_json = ?, characters_json = ?, last_narration = ?,
                 row_version = row_version + 1, updated_at = ?
             WHERE id = ? AND row_version = ?",
        )
        .bind(summary)
        .bind(state_json)
        .bind(characters_json)
        .bind(last_narration)
        .bind(now)
        .bind(id)
        .bind(expected_row_version)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Rewind restore: same CAS discipline as `commit_turn_state`, but also
    /// moves the memory-visibility watermark to the rewind target.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn restore_snapshot_state(
        &mut self,
        id: Uuid,
        expected_row_version: i64,
        summary: &str,
        state_json: &str,
        characters_json: &str,
        last_narration: Option<&str>,
        memory_visible_max_turn_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE campaigns
             SET summary = ?, state_json = ?, characters_json = ?, last_narration = ?,
                 memory_visible_max_turn_id = ?, row_version = row_version + 1, updated_at = ?
             WHERE id = ? AND row_version = ?",
        )
        .bind(summary)
        .bind(state_json)
        .bind(characters_json)
        .bind(last_narration)
        .bind(memory_visible_max_turn_id)
        .bind(now)
        .bind(id)
        .bind(expected_row_version)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
