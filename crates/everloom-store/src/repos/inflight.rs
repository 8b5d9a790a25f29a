//! Inflight-turn repository: the lease rows backing per-actor exclusion.
//!
//! The claim is a single upsert so a steal can never race a concurrent
//! claim: the insert either lands (no lease), updates (expired lease), or
//! touches zero rows (live lease held by someone else).

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::InflightTurnRow;

pub struct InflightRepo<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> InflightRepo<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Claims the lease for `(campaign, actor)`, stealing it if the current
    /// holder's `expires_at` is in the past. Returns `false` when a live
    /// lease blocks the claim.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn claim(
        &mut self,
        campaign_id: Uuid,
        actor_id: Uuid,
        claim_token: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO inflight_turns
                 (id, campaign_id, actor_id, claim_token, claimed_at, heartbeat_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (campaign_id, actor_id) DO UPDATE SET
                 claim_token = excluded.claim_token,
                 claimed_at = excluded.claimed_at,
                 heartbeat_at = excluded.heartbeat_at,
                 expires_at = excluded.expires_at
             WHERE inflight_turns.expires_at < excluded.claimed_at",
        )
        .bind(Uuid::new_v4())
        .bind(campaign_id)
        .bind(actor_id)
        .bind(claim_token)
        .bind(now)
        .bind(now)
        .bind(expires_at)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Whether `claim_token` still owns a non-expired lease.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn validate(
        &mut self,
        campaign_id: Uuid,
        actor_id: Uuid,
        claim_token: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let expires_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT expires_at FROM inflight_turns
             WHERE campaign_id = ? AND actor_id = ? AND claim_token = ?",
        )
        .bind(campaign_id)
        .bind(actor_id)
        .bind(claim_token)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(expires_at.is_some_and(|at| at >= now))
    }

    /// Extends the lease if `claim_token` still owns it. Returns `false`
    /// when the lease has been stolen or released.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn heartbeat(
        &mut self,
        campaign_id: Uuid,
        actor_id: Uuid,
        claim_token: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE inflight_turns SET heartbeat_at = ?, expires_at = ?
             WHERE campaign_id = ? AND actor_id = ? AND claim_token = ?",
        )
        .bind(now)
        .bind(expires_at)
        .bind(campaign_id)
        .bind(actor_id)
        .bind(claim_token)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Conditional delete on token match. Releasing an already-released or
    /// stolen lease touches zero rows and is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn release(
        &mut self,
        campaign_id: Uuid,
        actor_id: Uuid,
        claim_token: Uuid,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM inflight_turns
             WHERE campaign_id = ? AND actor_id = ? AND claim_token = ?",
        )
        .bind(campaign_id)
        .bind(actor_id)
        .bind(claim_token)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn get(
        &mut self,
        campaign_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Option<InflightTurnRow>, StoreError> {
        let row = sqlx::query_as::<_, InflightTurnRow>(
            "SELECT * FROM inflight_turns WHERE campaign_id = ? AND actor_id = ?",
        )
        .bind(campaign_id)
        .bind(actor_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(row)
    }
}
