//! Everloom Engine — turn resolution for persistent multi-actor campaigns.
//!
//! The engine resolves one player action at a time against a campaign: a
//! short claim-and-load transaction (Phase A), a long completion call
//! outside any transaction (Phase B), and a short commit transaction under
//! lease revalidation and a `row_version` CAS fence (Phase C). Around that
//! core sit the inflight-lease manager, the timer state machine driver, the
//! rewind controller, the memory-visibility filter, and the workers that
//! drain the outbox and expire timers.

pub mod engine;
pub mod error;
pub mod lease;
pub mod memory;
pub mod outbox;
pub mod prompt;
pub mod rewind;
pub mod timers;

mod items;

pub use engine::{EngineConfig, TurnEngine, TurnProbe};
pub use error::EngineError;
pub use lease::LeaseManager;
pub use outbox::{DispatcherConfig, DrainReport, OutboxDelivery, OutboxDispatcher};
pub use timers::{TimerSweep, TimerWorker};
