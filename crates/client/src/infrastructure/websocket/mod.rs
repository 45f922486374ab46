//! The WebSocket tap: socket client, frame interceptor, and dispatch.

mod client;
mod interceptor;
mod shared;

pub use client::GameSocket;
pub use interceptor::{Interceptor, MessageHandler, SubscriptionHandle, WILDCARD};
pub use shared::{BackoffState, ConnectionState};
