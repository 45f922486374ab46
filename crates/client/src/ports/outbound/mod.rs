//! Outbound ports (driven adapters).

mod clipboard;
mod clock;
mod ui;

pub use clipboard::{ClipboardPort, LoggingClipboard};
pub use clock::{Clock, SystemClock};
pub use ui::{
    MemoryOverlay, MutationBatch, OverlayNode, OverlaySink, UiEvent, UiNode, VisibilityState,
};
