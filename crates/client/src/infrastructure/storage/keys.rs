//! Store names and well-known document keys.
//!
//! Key strings are a persistence compatibility surface; renaming one
//! orphans the user's data.

// Stores
pub const SETTINGS: &str = "settings";
pub const COMBAT_STATS: &str = "combatStats";
pub const UNIFIED_RUNS: &str = "unifiedRuns";
pub const REROLL_SPENDING: &str = "rerollSpending";
pub const COMBAT_EXPORT: &str = "combatExport";

// Per-UI-group collapse state map (settings store)
pub const KEY_COLLAPSE_STATES: &str = "collapse-states";

// Interceptor-persisted message snapshots (settings store)
pub const KEY_INIT_CLIENT_DATA: &str = "initClientData";
pub const KEY_INIT_CHARACTER_DATA: &str = "initCharacterData";
pub const KEY_NEW_BATTLE: &str = "newBattle";

// Settings layer
pub const SETTINGS_DOC_PREFIX: &str = "settings_";
pub const KEY_KNOWN_CHARACTERS: &str = "knownCharacterIds";

// Market cache (settings store)
pub const KEY_MARKET_DATA: &str = "marketData";

// Dungeon tracker
pub const KEY_ALL_RUNS: &str = "allRuns";
pub const KEY_DUNGEON_IN_PROGRESS: &str = "dungeonTracker_inProgressRun";
pub const KEY_DUNGEON_UI_STATE: &str = "dungeonTracker_uiState";

// Enhancement tracker
pub const KEY_ENHANCEMENT_SESSIONS: &str = "enhancementTracker_sessions";
pub const KEY_ENHANCEMENT_CURRENT: &str = "enhancementTracker_currentSession";

// Combat stats popup
pub const KEY_LATEST_COMBAT_RUN: &str = "latestCombatRun";

// Task reroll spending
pub const KEY_TASK_REROLL_DATA: &str = "taskRerollData";

// Combat export
pub const KEY_CURRENT_PROFILE_ID: &str = "currentProfileId";

/// Per-character settings document key.
pub fn settings_doc_key(character_id: &str) -> String {
    format!("{SETTINGS_DOC_PREFIX}{character_id}")
}
