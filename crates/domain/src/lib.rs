//! Toolasha domain layer.
//!
//! Core types shared by the protocol and client crates: HRID identifiers,
//! the character projection, the game dictionary subset the calculators
//! consume, market prices, dungeon runs, enhancement sessions, and the
//! settings value model. No IO and no async here.

pub mod character;
pub mod dictionary;
pub mod enhancement;
pub mod error;
pub mod hrid;
pub mod market;
pub mod runs;
pub mod settings;

pub use character::{
    AbilityState, AchievementBuff, ActionEntry, CharacterInfo, CharacterState, CommunityBuff,
    ConsumableSlot, HouseRoom, InventoryItem, Party, PartyInfo, PartySlot, SkillState,
};
pub use dictionary::{
    AbilityDetail, ActionDetail, ClientData, CombatZoneInfo, DropEntry, DungeonInfo, ItemCount,
    ItemDetail, HouseRoomDetail, MonsterDetail, Recipe,
};
pub use enhancement::{
    EnhancementSession, LastAttempt, LevelAttempts, SessionPredictions, SessionState,
};
pub use error::DomainError;
pub use hrid::{AbilityHrid, ActionHrid, BuffHrid, HouseRoomHrid, ItemHrid, SkillHrid};
pub use market::{MarketPrice, MarketSnapshot, PriceContext, PriceSide};
pub use runs::{DungeonRun, RunSource};
pub use settings::{
    render_template, DependencyClause, DependencyMode, ScalarValue, SettingDef, SettingGroup,
    SettingType, SettingValue, TemplateFragment,
};
