//! Port definitions.
//!
//! The game UI, the clipboard, and the wall clock are external
//! collaborators; the runtime reaches them only through the traits in
//! `outbound`.

pub mod outbound;
