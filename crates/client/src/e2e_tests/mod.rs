//! End-to-end scenarios over the full runtime.
//!
//! Everything runs against a fake socket feed (frames pushed straight
//! into the interceptor), the in-memory overlay surface, a manual clock,
//! and an in-memory SQLite store. Registry delays are shortened so the
//! health-check/retry machinery runs inside test time.

mod boot_tests;
mod enhancement_tests;
mod harness;

pub use harness::*;
