//! Toolasha client runtime.
//!
//! The shared substrate every feature depends on: the WebSocket tap and
//! message dispatch, the UI mutation observer, the document store, the
//! settings layer, the character data manager, the market cache, the
//! feature registry, and the worker pool. Features live under
//! [`features`] and consume these through the context assembled by the
//! binary.

pub mod application;
pub mod config;
pub mod features;
pub mod infrastructure;
pub mod ports;
pub mod util;
pub mod workers;

#[cfg(test)]
mod e2e_tests;

pub use config::AppConfig;
