//! SQLite-backed store and its unit-of-work scope.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use crate::error::StoreError;
use crate::repos::{
    ActorRepo, CampaignRepo, EmbeddingRepo, InflightRepo, MediaRepo, OutboxRepo, PlayerRepo,
    SessionRepo, SnapshotRepo, TimerRepo, TurnRepo,
};
use crate::schema;

/// Handle to the database. Cheap to clone; every transactional scope is
/// opened through [`Store::begin`].
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Wraps an existing pool. The schema is assumed to be in place.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to `url` with foreign keys enabled and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the connection or migration fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON").execute(conn).await?;
                    Ok(())
                })
            })
            .connect(url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store for tests. Pinned to a single connection so the
    /// database lives exactly as long as the pool.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the connection or migration fails.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON").execute(conn).await?;
                    Ok(())
                })
            })
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Applies the schema. Idempotent; every statement is
    /// `CREATE ... IF NOT EXISTS`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if any DDL statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in schema::STATEMENTS {
            sqlx::raw_sql(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Opens a transactional scope over the repository set. Writes commit
    /// atomically via [`StoreTx::commit`] and are discarded when the scope
    /// drops without one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if a transaction cannot be started.
    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        Ok(StoreTx {
            tx: self.pool.begin().await?,
        })
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// A unit-of-work scope. Repositories borrow the scope mutably, so each
/// repository handle lives only for the duration of the call chain that
/// created it; nothing can outlive the transaction.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    /// Commits all writes made inside this scope.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the commit fails; the transaction is rolled
    /// back in that case.
    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    /// Explicitly discards all writes made inside this scope. Dropping the
    /// scope has the same effect.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the rollback fails.
    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }

    pub fn actors(&mut self) -> ActorRepo<'_> {
        ActorRepo::new(&mut self.tx)
    }

    pub fn campaigns(&mut self) -> CampaignRepo<'_> {
        CampaignRepo::new(&mut self.tx)
    }

    pub fn sessions(&mut self) -> SessionRepo<'_> {
        SessionRepo::new(&mut self.tx)
    }

    pub fn players(&mut self) -> PlayerRepo<'_> {
        PlayerRepo::new(&mut self.tx)
    }

    pub fn turns(&mut self) -> TurnRepo<'_> {
        TurnRepo::new(&mut self.tx)
    }

    pub fn snapshots(&mut self) -> SnapshotRepo<'_> {
        SnapshotRepo::new(&mut self.tx)
    }

    pub fn timers(&mut self) -> TimerRepo<'_> {
        TimerRepo::new(&mut self.tx)
    }

    pub fn inflight(&mut self) -> InflightRepo<'_> {
        InflightRepo::new(&mut self.tx)
    }

    pub fn outbox(&mut self) -> OutboxRepo<'_> {
        OutboxRepo::new(&mut self.tx)
    }

    pub fn embeddings(&mut self) -> EmbeddingRepo<'_> {
        EmbeddingRepo::new(&mut self.tx)
    }

    pub fn media(&mut self) -> MediaRepo<'_> {
        MediaRepo::new(&mut self.tx)
    }
}
