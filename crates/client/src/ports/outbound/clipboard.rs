//! Clipboard / new-tab port.
//!
//! Exports write JSON or URLs here. Payload formats are public contracts;
//! the port only transports them.

use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
}

pub trait ClipboardPort: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
    /// Open a companion site in a new tab.
    fn open_url(&self, url: &str) -> Result<(), ClipboardError>;
    /// The most recent payload, for the host bridge to pick up.
    fn last_payload(&self) -> Option<String>;
}

/// Default adapter: logs the payload and keeps the last one for the host
/// bridge. The embedding host owns the real clipboard.
#[derive(Default)]
pub struct LoggingClipboard {
    last: Mutex<Option<String>>,
}

impl LoggingClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClipboardPort for LoggingClipboard {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        tracing::info!(bytes = text.len(), "clipboard payload ready");
        if let Ok(mut last) = self.last.lock() {
            *last = Some(text.to_string());
        }
        Ok(())
    }

    fn open_url(&self, url: &str) -> Result<(), ClipboardError> {
        tracing::info!(%url, "open companion site");
        if let Ok(mut last) = self.last.lock() {
            *last = Some(url.to_string());
        }
        Ok(())
    }

    fn last_payload(&self) -> Option<String> {
        self.last.lock().ok().and_then(|l| l.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_payload_tracks_writes() {
        let clipboard = LoggingClipboard::new();
        assert!(clipboard.last_payload().is_none());
        clipboard.write_text("{\"1\":\"{}\"}").expect("write");
        assert_eq!(clipboard.last_payload().as_deref(), Some("{\"1\":\"{}\"}"));
    }
}
