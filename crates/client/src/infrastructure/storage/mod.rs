//! Durable key/value surface over an embedded SQLite database.

mod collapse;
pub mod keys;
mod store;

pub use collapse::CollapseStates;
pub use store::{DocumentStore, StorageError};
