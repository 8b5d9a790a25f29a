//! Everloom Store — SQLite persistence.
//!
//! The store owns the schema, the row models, and one repository per
//! entity. All mutation goes through a [`StoreTx`] unit-of-work scope:
//! writes inside a scope commit atomically and are fully discarded when the
//! scope is dropped without a commit.

pub mod error;
pub mod models;
pub mod repos;
pub mod schema;
pub mod store;

pub use error::StoreError;
pub use store::{Store, StoreTx};
