//! Inflight-lease manager.
//!
//! A lease row is the in-band mutex guaranteeing at most one in-flight turn
//! per `(campaign, actor)` across processes. Holders do not block each
//! other indefinitely: a lease whose `expires_at` has passed can be stolen
//! by the next claimant, which invalidates the original holder's token.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use everloom_core::clock::Clock;
use everloom_core::types::ClaimToken;
use everloom_store::{Store, StoreError};

/// Stand-alone lease operations, each in its own short transaction.
///
/// The turn engine embeds claim/validate/release inside its phase
/// transactions; this type serves the out-of-band uses — heartbeating
/// during Phase B, operator-initiated release, and stealing from a crashed
/// holder.
#[derive(Clone)]
pub struct LeaseManager {
    store: Store,
    clock: Arc<dyn Clock>,
    ttl_seconds: i64,
}

impl LeaseManager {
    /// Creates a manager issuing leases with the given TTL.
    #[must_use]
    pub fn new(store: Store, clock: Arc<dyn Clock>, ttl_seconds: i64) -> Self {
        Self {
            store,
            clock,
            ttl_seconds,
        }
    }

    /// The TTL applied to claims and heartbeat extensions.
    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Claims the lease for `(campaign, actor)`, stealing an expired one.
    /// Returns `None` when a live lease blocks the claim.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn claim(
        &self,
        campaign_id: Uuid,
        actor_id: Uuid,
    ) -> Result<Option<ClaimToken>, StoreError> {
        let token = ClaimToken::random();
        let now = self.clock.now();
        let expires_at = now + Duration::seconds(self.ttl_seconds);

        let mut tx = self.store.begin().await?;
        let claimed = tx
            .inflight()
            .claim(campaign_id, actor_id, token.as_uuid(), now, expires_at)
            .await?;
        if claimed {
            tx.commit().await?;
            Ok(Some(token))
        } else {
            tx.rollback().await?;
            Ok(None)
        }
    }

    /// Extends the lease by one TTL from now. Returns `false` when the
    /// token no longer owns the lease.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn heartbeat(
        &self,
        campaign_id: Uuid,
        actor_id: Uuid,
        token: ClaimToken,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let expires_at = now + Duration::seconds(self.ttl_seconds);

        let mut tx = self.store.begin().await?;
        let extended = tx
            .inflight()
            .heartbeat(campaign_id, actor_id, token.as_uuid(), now, expires_at)
            .await?;
        tx.commit().await?;
        Ok(extended)
    }

    /// Read-only check that `token` still owns a non-expired lease.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn validate(
        &self,
        campaign_id: Uuid,
        actor_id: Uuid,
        token: ClaimToken,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let valid = tx
            .inflight()
            .validate(campaign_id, actor_id, token.as_uuid(), now)
            .await?;
        tx.rollback().await?;
        Ok(valid)
    }

    /// Releases the lease if `token` owns it. Idempotent: releasing an
    /// already-released or stolen lease succeeds and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on database failure.
    pub async fn release(
        &self,
        campaign_id: Uuid,
        actor_id: Uuid,
        token: ClaimToken,
    ) -> Result<bool, StoreError> {
        let mut tx = self.store.begin().await?;
        let released = tx
            .inflight()
            .release(campaign_id, actor_id, token.as_uuid())
            .await?;
        tx.commit().await?;
        Ok(released == 1)
    }
}
