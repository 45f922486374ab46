//! Inbound WebSocket message types.
//!
//! Frames are JSON text tagged by a `type` field. Only the types Toolasha
//! consumes are modelled; everything else parses to [`GameMessage::Other`]
//! with the raw value retained on the [`Envelope`] for wildcard
//! subscribers. A frame that is not a JSON object with a string `type`
//! field is not a game message at all.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use toolasha_domain::{
    AbilityState, ActionEntry, ActionHrid, CharacterInfo, CharacterState, ClientData,
    ConsumableSlot, HouseRoom, HouseRoomHrid, InventoryItem, ItemHrid, SkillState,
};

use crate::chat::ChatMessage;

/// One combatant in a `new_battle` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleUnit {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub character_id: Option<String>,
    #[serde(default)]
    pub is_player: bool,
    #[serde(default)]
    pub current_hitpoints: f64,
    #[serde(default)]
    pub max_hitpoints: f64,
}

/// A quest line entry; kept by the Data Manager outside the character
/// projection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub monster_hrid: Option<String>,
    #[serde(default)]
    pub action_hrid: Option<ActionHrid>,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LootLogEntry {
    #[serde(default)]
    pub action_hrid: Option<ActionHrid>,
    #[serde(default)]
    pub item_hrid: Option<ItemHrid>,
    #[serde(default)]
    pub count: i64,
}

/// A read-only loadout snapshot of another player, from `profile_shared`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedProfile {
    #[serde(default)]
    pub character_name: String,
    #[serde(default)]
    pub equipment: Vec<InventoryItem>,
    #[serde(default)]
    pub abilities: Vec<AbilityState>,
    #[serde(default)]
    pub skills: Vec<SkillState>,
    #[serde(default)]
    pub house_room_map: HashMap<HouseRoomHrid, HouseRoom>,
}

/// Inbound messages, tagged by the wire `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameMessage {
    /// The static game dictionary.
    InitClientData(Box<ClientData>),
    /// The bulk player snapshot (login and reconciliations).
    InitCharacterData(Box<CharacterState>),
    CharacterUpdated {
        character: CharacterInfo,
    },
    ItemsUpdated {
        #[serde(default)]
        items: Vec<InventoryItem>,
    },
    /// The game always sends the full queue.
    ActionsUpdated {
        #[serde(default)]
        actions: Vec<ActionEntry>,
    },
    SkillsUpdated {
        #[serde(default)]
        skills: Vec<SkillState>,
    },
    NewBattle {
        #[serde(default)]
        battle_id: String,
        #[serde(default)]
        wave: u32,
        #[serde(default)]
        players: Vec<BattleUnit>,
        #[serde(default)]
        monsters: Vec<BattleUnit>,
    },
    ActionCompleted {
        action: ActionEntry,
    },
    BattleUnitFetched {
        unit: BattleUnit,
    },
    /// Self-only: the player's own combat consumable/ability loadout.
    BattleConsumableAbilityUpdated {
        #[serde(default)]
        abilities: Vec<AbilityState>,
    },
    ChatMessageReceived {
        message: ChatMessage,
    },
    QuestsUpdated {
        #[serde(default)]
        quests: Vec<Quest>,
    },
    LootLogUpdated {
        #[serde(default)]
        loot_log: Vec<LootLogEntry>,
    },
    HouseRoomsUpdated {
        #[serde(default)]
        house_room_map: HashMap<HouseRoomHrid, HouseRoom>,
    },
    ConsumablesUpdated {
        #[serde(default)]
        action_type_food_slots_map: HashMap<String, Vec<Option<ConsumableSlot>>>,
        #[serde(default)]
        action_type_drink_slots_map: HashMap<String, Vec<Option<ConsumableSlot>>>,
    },
    ProfileShared {
        profile: SharedProfile,
    },
    /// Unknown or malformed-but-typed frame; the raw value lives on the
    /// envelope.
    #[serde(skip)]
    Other,
}

/// A parsed inbound frame: the raw value plus the narrowed message.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub type_tag: String,
    pub raw: Value,
    pub message: GameMessage,
}

/// Parse one text frame. Returns `None` for non-JSON frames, non-object
/// payloads, and objects without a string `type` field; those are not
/// game messages and are silently ignored upstream.
pub fn parse_frame(text: &str) -> Option<Envelope> {
    let raw: Value = serde_json::from_str(text).ok()?;
    let type_tag = raw.as_object()?.get("type")?.as_str()?.to_string();
    let message =
        serde_json::from_value::<GameMessage>(raw.clone()).unwrap_or(GameMessage::Other);
    Some(Envelope {
        type_tag,
        raw,
        message,
    })
}
