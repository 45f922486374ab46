//! Party-chat system messages.
//!
//! The game renders system messages from a template token (`m`) plus a
//! rendered text body. Toolasha mines four of them for dungeon timing and
//! team composition. The token list is not centralized anywhere by the
//! game; unknown tokens flow through as [`SystemToken::Other`].

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Deserialize;

/// One received chat message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Channel HRID, e.g. `/chat_channel_types/party`.
    #[serde(default)]
    pub channel_type_hrid: String,
    /// System template token, e.g. `systemChatMessage.partyKeyCount`.
    /// Empty for plain player messages.
    #[serde(rename = "m", default)]
    pub template: String,
    /// Rendered text body.
    #[serde(default)]
    pub message: String,
    /// Sender name; empty for system messages.
    #[serde(default)]
    pub name: String,
}

impl ChatMessage {
    pub fn is_party_channel(&self) -> bool {
        self.channel_type_hrid == "/chat_channel_types/party"
    }

    pub fn system_token(&self) -> SystemToken {
        SystemToken::from_template(&self.template)
    }
}

/// Recognized system message tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemToken {
    PartyBattleStarted,
    PartyKeyCount,
    PartyFailed,
    BattleEnded,
    /// Anything else, including non-system messages.
    Other(String),
}

impl SystemToken {
    const PREFIX: &'static str = "systemChatMessage.";

    pub fn from_template(template: &str) -> Self {
        match template.strip_prefix(Self::PREFIX) {
            Some("partyBattleStarted") => Self::PartyBattleStarted,
            Some("partyKeyCount") => Self::PartyKeyCount,
            Some("partyFailed") => Self::PartyFailed,
            Some("battleEnded") => Self::BattleEnded,
            _ => Self::Other(template.to_string()),
        }
    }
}

static KEY_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z0-9_ ]+?)\s*:\s*(\d+)").expect("key count regex"));

/// Parse the per-player counters out of a rendered key-count body, e.g.
/// `"Key count - Alice: 3, Bob: 5"` → `[("Alice", 3), ("Bob", 5)]`.
/// Name order follows the message.
pub fn parse_key_counts(body: &str) -> Vec<(String, u64)> {
    // Everything before the first dash is the label, not a player.
    let counters = match body.split_once('-') {
        Some((_, rest)) => rest,
        None => body,
    };
    KEY_COUNT_RE
        .captures_iter(counters)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().trim().to_string();
            let count: u64 = caps.get(2)?.as_str().parse().ok()?;
            if name.is_empty() {
                None
            } else {
                Some((name, count))
            }
        })
        .collect()
}

static TS_SLASH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})\s+(\d{1,2}):(\d{2}):(\d{2})\s*(AM|PM)$")
        .expect("slash timestamp regex")
});

static TS_DASH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})-(\d{1,2})\s+(\d{1,2}):(\d{2}):(\d{2})$").expect("dash timestamp regex")
});

/// Parse a chat-history timestamp. Two formats appear in the wild:
/// `MM/DD HH:MM:SS AM/PM` and `DD-M HH:MM:SS` (24h). Neither carries a
/// year; the caller supplies one.
pub fn parse_chat_timestamp(text: &str, year: i32) -> Option<NaiveDateTime> {
    let text = text.trim();

    if let Some(caps) = TS_SLASH_RE.captures(text) {
        let month: u32 = caps.get(1)?.as_str().parse().ok()?;
        let day: u32 = caps.get(2)?.as_str().parse().ok()?;
        let mut hour: u32 = caps.get(3)?.as_str().parse().ok()?;
        let minute: u32 = caps.get(4)?.as_str().parse().ok()?;
        let second: u32 = caps.get(5)?.as_str().parse().ok()?;
        let meridiem = caps.get(6)?.as_str();

        if hour == 12 {
            hour = 0;
        }
        if meridiem == "PM" {
            hour += 12;
        }
        return NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second);
    }

    if let Some(caps) = TS_DASH_RE.captures(text) {
        let day: u32 = caps.get(1)?.as_str().parse().ok()?;
        let month: u32 = caps.get(2)?.as_str().parse().ok()?;
        let hour: u32 = caps.get(3)?.as_str().parse().ok()?;
        let minute: u32 = caps.get(4)?.as_str().parse().ok()?;
        let second: u32 = caps.get(5)?.as_str().parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second);
    }

    None
}
