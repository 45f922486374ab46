//! Toolasha protocol layer.
//!
//! The game's WebSocket protocol is not ours; this crate only models the
//! inbound frames Toolasha observes, the party-chat system messages it
//! mines for dungeon timing, and the three outbound export payloads whose
//! shapes are public contracts with companion sites.

pub mod chat;
pub mod exports;
pub mod messages;

pub use chat::{parse_chat_timestamp, parse_key_counts, ChatMessage, SystemToken};
pub use exports::{
    build_character_sheet_url, CombatSimExport, MilkonomyActionConfig, MilkonomyEquipment,
    MilkonomyExport, SimAbility, SimConsumable, SimEquipment, SimPlayer, SimPlayerStats,
    BLANK_PLAYER, COMBAT_ACTION_TYPE, MILKONOMY_SKILLS,
};
pub use messages::{
    parse_frame, BattleUnit, Envelope, GameMessage, LootLogEntry, Quest, SharedProfile,
};
