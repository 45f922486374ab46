//! Shared helpers.

pub mod format;

pub use format::{
    format_compact_number, format_duration_ms, format_percent, MISSING_PRICE_MARKER,
};
