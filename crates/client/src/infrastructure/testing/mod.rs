//! Test fixtures shared by unit and e2e tests.

mod fixtures;

pub use fixtures::{node_with_class, ManualClock};
