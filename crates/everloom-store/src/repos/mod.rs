//! Typed repositories, one per entity.
//!
//! Every repository borrows the enclosing [`crate::StoreTx`] mutably, so a
//! handle can never escape its unit of work. Conditional updates return the
//! affected-row signal (`bool` for single-row operations, a count for bulk
//! ones) instead of erroring, because the engine's idempotency rules are
//! built on "zero rows touched is a no-op".

mod actors;
mod campaigns;
mod embeddings;
mod inflight;
mod media;
mod outbox;
mod players;
mod sessions;
mod snapshots;
mod timers;
mod turns;

pub use actors::ActorRepo;
pub use campaigns::CampaignRepo;
pub use embeddings::EmbeddingRepo;
pub use inflight::InflightRepo;
pub use media::MediaRepo;
pub use outbox::OutboxRepo;
pub use players::PlayerRepo;
pub use sessions::SessionRepo;
pub use snapshots::SnapshotRepo;
pub use timers::TimerRepo;
pub use turns::TurnRepo;
