//! Color tokens derived from settings.
//!
//! Features read these synchronously; the service recomputes them after
//! any color setting changes.

pub const DEFAULT_ACCENT: &str = "#22aa99";
pub const DEFAULT_TEXT_PRIMARY: &str = "#e8e8e8";
pub const DEFAULT_MAIN: &str = "#546ddb";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTokens {
    pub accent: String,
    pub text_primary: String,
    pub main: String,
}

impl Default for ColorTokens {
    fn default() -> Self {
        Self {
            accent: DEFAULT_ACCENT.to_string(),
            text_primary: DEFAULT_TEXT_PRIMARY.to_string(),
            main: DEFAULT_MAIN.to_string(),
        }
    }
}
