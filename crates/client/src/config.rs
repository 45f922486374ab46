//! Application configuration, loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

const DEFAULT_GAME_WS_URL: &str = "wss://www.milkywayidle.com/ws";
const DEFAULT_MARKET_URL: &str = "https://www.milkywayidle.com/game_data/marketplace.json";
const DEFAULT_MARKET_TTL_SECS: u64 = 900;
const DEFAULT_FLUSH_WINDOW_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Game traffic endpoint the socket tap attaches to.
    pub game_ws_url: String,
    /// Market snapshot URL; also overridable per character via settings.
    pub market_url: String,
    /// Where the document store lives.
    pub data_dir: PathBuf,
    pub market_ttl: Duration,
    /// Write-coalescing window for the document store.
    pub flush_window: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let game_ws_url =
            std::env::var("TOOLASHA_GAME_WS_URL").unwrap_or_else(|_| DEFAULT_GAME_WS_URL.into());
        let market_url =
            std::env::var("TOOLASHA_MARKET_URL").unwrap_or_else(|_| DEFAULT_MARKET_URL.into());

        let data_dir = match std::env::var("TOOLASHA_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => directories::ProjectDirs::from("", "", "toolasha")
                .context("no home directory available for the data dir")?
                .data_dir()
                .to_path_buf(),
        };

        let market_ttl = Duration::from_secs(
            std::env::var("TOOLASHA_MARKET_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MARKET_TTL_SECS),
        );
        let flush_window = Duration::from_millis(
            std::env::var("TOOLASHA_FLUSH_WINDOW_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_FLUSH_WINDOW_MS),
        );

        Ok(Self {
            game_ws_url,
            market_url,
            data_dir,
            market_ttl,
            flush_window,
        })
    }
}
