//! Outbound export payloads.
//!
//! Three formats are consumed by third-party companion sites and must be
//! preserved bit-exactly: the Combat-Sim multi-player export, the
//! Milkonomy export (including its historical `specialEquimentMap` field
//! spelling), and the character-sheet URL. Field names are pinned with
//! explicit `rename` attributes; do not "fix" them.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use toolasha_domain::{CharacterState, HouseRoomHrid, SkillHrid};

// =============================================================================
// Combat-Sim multi-player export
// =============================================================================

pub const COMBAT_ACTION_TYPE: &str = "/action_types/combat";

/// Combat stat skills in slot order, paired with their export field.
const COMBAT_STAT_SKILLS: [(&str, &str); 7] = [
    ("/skills/stamina", "staminaLevel"),
    ("/skills/intelligence", "intelligenceLevel"),
    ("/skills/attack", "attackLevel"),
    ("/skills/melee", "meleeLevel"),
    ("/skills/defense", "defenseLevel"),
    ("/skills/ranged", "rangedLevel"),
    ("/skills/magic", "magicLevel"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEquipment {
    #[serde(rename = "itemLocationHrid")]
    pub item_location_hrid: String,
    #[serde(rename = "itemHrid")]
    pub item_hrid: String,
    #[serde(rename = "enhancementLevel")]
    pub enhancement_level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimPlayerStats {
    #[serde(rename = "staminaLevel")]
    pub stamina_level: u32,
    #[serde(rename = "intelligenceLevel")]
    pub intelligence_level: u32,
    #[serde(rename = "attackLevel")]
    pub attack_level: u32,
    #[serde(rename = "meleeLevel")]
    pub melee_level: u32,
    #[serde(rename = "defenseLevel")]
    pub defense_level: u32,
    #[serde(rename = "rangedLevel")]
    pub ranged_level: u32,
    #[serde(rename = "magicLevel")]
    pub magic_level: u32,
    pub equipment: Vec<SimEquipment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConsumable {
    #[serde(rename = "itemHrid")]
    pub item_hrid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimAbility {
    #[serde(rename = "abilityHrid")]
    pub ability_hrid: String,
    pub level: u32,
}

/// One player slot of the multi-player export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimPlayer {
    pub player: SimPlayerStats,
    /// Keyed by action type; combat uses three slots.
    pub food: BTreeMap<String, Vec<SimConsumable>>,
    pub drinks: BTreeMap<String, Vec<SimConsumable>>,
    /// Slot 0 is the special ability.
    pub abilities: Vec<SimAbility>,
    #[serde(rename = "triggerMap")]
    pub trigger_map: BTreeMap<String, Value>,
    #[serde(rename = "houseRooms")]
    pub house_rooms: BTreeMap<String, u32>,
    pub achievements: BTreeMap<String, Value>,
}

fn empty_consumables() -> Vec<SimConsumable> {
    (0..3)
        .map(|_| SimConsumable {
            item_hrid: String::new(),
        })
        .collect()
}

/// The fixed empty slot template. Slots "2"–"5" of a solo export are
/// exactly this object.
pub static BLANK_PLAYER: Lazy<SimPlayer> = Lazy::new(|| {
    let mut food = BTreeMap::new();
    food.insert(COMBAT_ACTION_TYPE.to_string(), empty_consumables());
    let mut drinks = BTreeMap::new();
    drinks.insert(COMBAT_ACTION_TYPE.to_string(), empty_consumables());
    SimPlayer {
        player: SimPlayerStats {
            stamina_level: 1,
            intelligence_level: 1,
            attack_level: 1,
            melee_level: 1,
            defense_level: 1,
            ranged_level: 1,
            magic_level: 1,
            equipment: Vec::new(),
        },
        food,
        drinks,
        abilities: (0..5)
            .map(|_| SimAbility {
                ability_hrid: String::new(),
                level: 1,
            })
            .collect(),
        trigger_map: BTreeMap::new(),
        house_rooms: BTreeMap::new(),
        achievements: BTreeMap::new(),
    }
});

impl SimPlayer {
    /// Build the slot for the current character: equipped items, combat
    /// loadouts, abilities (special in slot 0, normals in 1..4), and every
    /// house room the character has.
    pub fn from_character(state: &CharacterState) -> Self {
        let mut slot = BLANK_PLAYER.clone();

        let stat = |hrid: &str| state.skill_level(&SkillHrid::new(hrid)).max(1);
        slot.player.stamina_level = stat(COMBAT_STAT_SKILLS[0].0);
        slot.player.intelligence_level = stat(COMBAT_STAT_SKILLS[1].0);
        slot.player.attack_level = stat(COMBAT_STAT_SKILLS[2].0);
        slot.player.melee_level = stat(COMBAT_STAT_SKILLS[3].0);
        slot.player.defense_level = stat(COMBAT_STAT_SKILLS[4].0);
        slot.player.ranged_level = stat(COMBAT_STAT_SKILLS[5].0);
        slot.player.magic_level = stat(COMBAT_STAT_SKILLS[6].0);

        let mut equipment: Vec<SimEquipment> = state
            .equipment()
            .into_iter()
            .map(|(location, item)| SimEquipment {
                item_location_hrid: location,
                item_hrid: item.item_hrid.as_str().to_string(),
                enhancement_level: item.enhancement_level,
            })
            .collect();
        equipment.sort_by(|a, b| a.item_location_hrid.cmp(&b.item_location_hrid));
        slot.player.equipment = equipment;

        let fill = |slots: Option<&Vec<Option<toolasha_domain::ConsumableSlot>>>| {
            let mut out = empty_consumables();
            if let Some(slots) = slots {
                for (i, entry) in slots.iter().take(3).enumerate() {
                    if let Some(consumable) = entry {
                        out[i].item_hrid = consumable.item_hrid.as_str().to_string();
                    }
                }
            }
            out
        };
        slot.food.insert(
            COMBAT_ACTION_TYPE.to_string(),
            fill(state.action_type_food_slots_map.get(COMBAT_ACTION_TYPE)),
        );
        slot.drinks.insert(
            COMBAT_ACTION_TYPE.to_string(),
            fill(state.action_type_drink_slots_map.get(COMBAT_ACTION_TYPE)),
        );

        if let Some(special) = state.special_ability() {
            slot.abilities[0] = SimAbility {
                ability_hrid: special.ability_hrid.as_str().to_string(),
                level: special.level,
            };
        }
        for (i, ability) in state.normal_abilities().into_iter().take(4).enumerate() {
            slot.abilities[i + 1] = SimAbility {
                ability_hrid: ability.ability_hrid.as_str().to_string(),
                level: ability.level,
            };
        }

        slot.house_rooms = state
            .house_room_map
            .iter()
            .map(|(hrid, room)| (hrid.as_str().to_string(), room.level))
            .collect();

        slot
    }
}

/// The full multi-player export: five numbered slots, each a
/// JSON-stringified player object.
#[derive(Debug, Clone, PartialEq)]
pub struct CombatSimExport {
    slots: BTreeMap<String, SimPlayer>,
}

impl CombatSimExport {
    /// Solo export: the character in slot "1", BLANK in "2"–"5".
    pub fn solo(state: &CharacterState) -> Self {
        let mut slots = BTreeMap::new();
        slots.insert("1".to_string(), SimPlayer::from_character(state));
        for n in 2..=5 {
            slots.insert(n.to_string(), BLANK_PLAYER.clone());
        }
        Self { slots }
    }

    pub fn slot(&self, n: u8) -> Option<&SimPlayer> {
        self.slots.get(&n.to_string())
    }

    pub fn set_slot(&mut self, n: u8, player: SimPlayer) {
        self.slots.insert(n.to_string(), player);
    }

    /// The clipboard payload: an object whose values are themselves JSON
    /// strings, one per slot.
    pub fn to_clipboard_string(&self) -> Result<String, serde_json::Error> {
        let mut out: BTreeMap<String, String> = BTreeMap::new();
        for (key, player) in &self.slots {
            out.insert(key.clone(), serde_json::to_string(player)?);
        }
        serde_json::to_string(&out)
    }
}

// =============================================================================
// Milkonomy export
// =============================================================================

/// The ten production skills keyed in `actionConfigMap`, in order.
pub const MILKONOMY_SKILLS: [&str; 10] = [
    "milking",
    "foraging",
    "woodcutting",
    "cheesesmithing",
    "crafting",
    "tailoring",
    "cooking",
    "brewing",
    "alchemy",
    "enhancing",
];

/// The eight special equipment slots.
pub const MILKONOMY_SPECIAL_SLOTS: [&str; 8] = [
    "/item_locations/earrings",
    "/item_locations/ring",
    "/item_locations/neck",
    "/item_locations/head",
    "/item_locations/hands",
    "/item_locations/feet",
    "/item_locations/back",
    "/item_locations/pouch",
];

/// The four exported community buffs.
pub const MILKONOMY_COMMUNITY_BUFFS: [&str; 4] = [
    "/community_buff_types/experience",
    "/community_buff_types/gathering_quantity",
    "/community_buff_types/production_efficiency",
    "/community_buff_types/enhancing_speed",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilkonomyEquipment {
    #[serde(rename = "itemHrid")]
    pub item_hrid: String,
    #[serde(rename = "enhancementLevel")]
    pub enhancement_level: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MilkonomyActionConfig {
    pub action: String,
    #[serde(rename = "playerLevel")]
    pub player_level: u32,
    pub tool: Option<MilkonomyEquipment>,
    pub legs: Option<MilkonomyEquipment>,
    pub body: Option<MilkonomyEquipment>,
    pub charm: Option<MilkonomyEquipment>,
    #[serde(rename = "houseLevel")]
    pub house_level: u32,
    pub tea: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilkonomyExport {
    pub name: String,
    pub color: String,
    #[serde(rename = "actionConfigMap")]
    pub action_config_map: BTreeMap<String, MilkonomyActionConfig>,
    // Historical misspelling; part of the public contract.
    #[serde(rename = "specialEquimentMap")]
    pub special_equipment_map: BTreeMap<String, Option<MilkonomyEquipment>>,
    #[serde(rename = "communityBuffMap")]
    pub community_buff_map: BTreeMap<String, u32>,
}

impl MilkonomyExport {
    pub fn from_character(state: &CharacterState, name: &str, color: &str) -> Self {
        let equipment = state.equipment();
        let equip_at = |location: &str| {
            equipment.get(location).map(|item| MilkonomyEquipment {
                item_hrid: item.item_hrid.as_str().to_string(),
                enhancement_level: item.enhancement_level,
            })
        };

        let mut action_config_map = BTreeMap::new();
        for skill in MILKONOMY_SKILLS {
            let skill_hrid = SkillHrid::new(format!("/skills/{skill}"));
            let action_type = format!("/action_types/{skill}");
            let tea = state
                .action_type_drink_slots_map
                .get(&action_type)
                .map(|slots| {
                    slots
                        .iter()
                        .flatten()
                        .map(|slot| slot.item_hrid.as_str().to_string())
                        .collect()
                })
                .unwrap_or_default();
            let house_room = HouseRoomHrid::new(format!("/house_rooms/{skill}_room"));

            action_config_map.insert(
                skill.to_string(),
                MilkonomyActionConfig {
                    action: String::new(),
                    player_level: state.skill_level(&skill_hrid),
                    tool: equip_at(&format!("/item_locations/{skill}_tool")),
                    legs: equip_at("/item_locations/legs"),
                    body: equip_at("/item_locations/body"),
                    charm: equip_at("/item_locations/charm"),
                    house_level: state.house_room_level(&house_room),
                    tea,
                },
            );
        }

        let special_equipment_map = MILKONOMY_SPECIAL_SLOTS
            .iter()
            .map(|slot| (slot.to_string(), equip_at(slot)))
            .collect();

        let community_buff_map = MILKONOMY_COMMUNITY_BUFFS
            .iter()
            .map(|buff| {
                (
                    buff.to_string(),
                    state.community_buff_level(&toolasha_domain::BuffHrid::new(*buff)),
                )
            })
            .collect();

        Self {
            name: name.to_string(),
            color: color.to_string(),
            action_config_map,
            special_equipment_map,
            community_buff_map,
        }
    }

    pub fn to_clipboard_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Character-sheet URL
// =============================================================================

/// Skill ordering for the `<skills>` segment.
const CHARSHEET_SKILL_ORDER: [&str; 17] = [
    "/skills/stamina",
    "/skills/intelligence",
    "/skills/attack",
    "/skills/melee",
    "/skills/defense",
    "/skills/ranged",
    "/skills/magic",
    "/skills/milking",
    "/skills/foraging",
    "/skills/woodcutting",
    "/skills/cheesesmithing",
    "/skills/crafting",
    "/skills/tailoring",
    "/skills/cooking",
    "/skills/brewing",
    "/skills/alchemy",
    "/skills/enhancing",
];

/// Equipment slot ordering for the `<equipment>` segment.
const CHARSHEET_EQUIPMENT_ORDER: [&str; 14] = [
    "/item_locations/head",
    "/item_locations/body",
    "/item_locations/legs",
    "/item_locations/feet",
    "/item_locations/hands",
    "/item_locations/main_hand",
    "/item_locations/two_hand",
    "/item_locations/off_hand",
    "/item_locations/neck",
    "/item_locations/earrings",
    "/item_locations/ring",
    "/item_locations/back",
    "/item_locations/pouch",
    "/item_locations/charm",
];

/// Build the character-sheet URL:
/// `<base>/?urpt=<general>;<skills>;<equipment>;<abilities>;<food>;<housing>;<achievements>`.
/// Every segment is a comma-separated token list with fixed ordering.
pub fn build_character_sheet_url(base: &str, state: &CharacterState) -> String {
    let general = [
        state.character.name.clone(),
        state.character.avatar_hrid.clone(),
        state.character.outfit_hrid.clone(),
    ]
    .join(",");

    let skills = CHARSHEET_SKILL_ORDER
        .iter()
        .map(|hrid| state.skill_level(&SkillHrid::new(*hrid)).to_string())
        .collect::<Vec<_>>()
        .join(",");

    let equipment_view = state.equipment();
    let equipment = CHARSHEET_EQUIPMENT_ORDER
        .iter()
        .map(|location| match equipment_view.get(*location) {
            Some(item) => format!("{}~{}", item.item_hrid, item.enhancement_level),
            None => String::new(),
        })
        .collect::<Vec<_>>()
        .join(",");

    let mut ability_tokens: Vec<String> = Vec::with_capacity(5);
    ability_tokens.push(match state.special_ability() {
        Some(a) => format!("{}~{}", a.ability_hrid, a.level),
        None => String::new(),
    });
    let normals = state.normal_abilities();
    for i in 0..4 {
        ability_tokens.push(match normals.get(i) {
            Some(a) => format!("{}~{}", a.ability_hrid, a.level),
            None => String::new(),
        });
    }
    let abilities = ability_tokens.join(",");

    let consumable_tokens = |map: &std::collections::HashMap<
        String,
        Vec<Option<toolasha_domain::ConsumableSlot>>,
    >| {
        map.get(COMBAT_ACTION_TYPE)
            .map(|slots| {
                slots
                    .iter()
                    .take(3)
                    .map(|slot| {
                        slot.as_ref()
                            .map(|s| s.item_hrid.as_str().to_string())
                            .unwrap_or_default()
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|| vec![String::new(); 3])
    };
    let mut food_tokens = consumable_tokens(&state.action_type_food_slots_map);
    food_tokens.extend(consumable_tokens(&state.action_type_drink_slots_map));
    let food = food_tokens.join(",");

    let mut housing_tokens: Vec<String> = state
        .house_room_map
        .iter()
        .map(|(hrid, room)| format!("{}~{}", hrid, room.level))
        .collect();
    housing_tokens.sort();
    let housing = housing_tokens.join(",");

    let mut achievement_tokens: Vec<String> = state
        .achievement_buffs
        .iter()
        .map(|buff| {
            format!(
                "{}~{}~{}",
                buff.action_type_hrid, buff.buff_type_hrid, buff.flat_boost
            )
        })
        .collect();
    achievement_tokens.sort();
    let achievements = achievement_tokens.join(",");

    format!(
        "{base}/?urpt={general};{skills};{equipment};{abilities};{food};{housing};{achievements}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolasha_domain::{
        AbilityState, AchievementBuff, ConsumableSlot, HouseRoom, InventoryItem, ItemHrid,
        SkillState,
    };

    fn character() -> CharacterState {
        let mut state = CharacterState::default();
        state.character.name = "Alice".to_string();
        state.skills = vec![
            SkillState {
                skill_hrid: SkillHrid::new("/skills/attack"),
                level: 70,
                experience: 0.0,
            },
            SkillState {
                skill_hrid: SkillHrid::new("/skills/stamina"),
                level: 65,
                experience: 0.0,
            },
        ];
        state.inventory = vec![InventoryItem {
            item_hrid: ItemHrid::new("/items/cheese_sword"),
            item_location_hrid: "/item_locations/main_hand".to_string(),
            enhancement_level: 5,
            count: 1,
        }];
        state.abilities = vec![
            AbilityState {
                ability_hrid: toolasha_domain::AbilityHrid::new("/abilities/vampirism"),
                level: 12,
                slot_number: 0,
            },
            AbilityState {
                ability_hrid: toolasha_domain::AbilityHrid::new("/abilities/cleave"),
                level: 8,
                slot_number: 1,
            },
        ];
        state.house_room_map.insert(
            toolasha_domain::HouseRoomHrid::new("/house_rooms/dining_room"),
            HouseRoom { level: 3 },
        );
        let mut food = std::collections::HashMap::new();
        food.insert(
            COMBAT_ACTION_TYPE.to_string(),
            vec![
                Some(ConsumableSlot {
                    item_hrid: ItemHrid::new("/items/cheese"),
                }),
                None,
                None,
            ],
        );
        state.action_type_food_slots_map = food;
        state
    }

    #[test]
    fn test_blank_player_shape() {
        let json = serde_json::to_value(&*BLANK_PLAYER).expect("serialize");
        assert_eq!(json["player"]["staminaLevel"], 1);
        assert_eq!(json["player"]["meleeLevel"], 1);
        assert_eq!(json["player"]["equipment"], serde_json::json!([]));
        assert_eq!(json["abilities"].as_array().map(|a| a.len()), Some(5));
        assert_eq!(json["abilities"][0]["abilityHrid"], "");
        assert_eq!(json["abilities"][0]["level"], 1);
        assert_eq!(
            json["food"][COMBAT_ACTION_TYPE].as_array().map(|a| a.len()),
            Some(3)
        );
        assert_eq!(json["triggerMap"], serde_json::json!({}));
        assert_eq!(json["houseRooms"], serde_json::json!({}));
    }

    #[test]
    fn test_solo_export_slots() {
        let export = CombatSimExport::solo(&character());
        let clipboard = export.to_clipboard_string().expect("clipboard");
        let parsed: BTreeMap<String, String> =
            serde_json::from_str(&clipboard).expect("outer parse");
        assert_eq!(
            parsed.keys().cloned().collect::<Vec<_>>(),
            vec!["1", "2", "3", "4", "5"]
        );

        let slot1: serde_json::Value = serde_json::from_str(&parsed["1"]).expect("slot 1");
        assert_eq!(slot1["player"]["attackLevel"], 70);
        assert_eq!(slot1["player"]["equipment"][0]["itemHrid"], "/items/cheese_sword");
        assert_eq!(slot1["player"]["equipment"][0]["enhancementLevel"], 5);
        assert_eq!(slot1["abilities"][0]["abilityHrid"], "/abilities/vampirism");
        assert_eq!(slot1["abilities"][1]["abilityHrid"], "/abilities/cleave");
        assert_eq!(slot1["abilities"][2]["abilityHrid"], "");
        assert_eq!(slot1["houseRooms"]["/house_rooms/dining_room"], 3);
        assert_eq!(slot1["food"][COMBAT_ACTION_TYPE][0]["itemHrid"], "/items/cheese");

        let blank = serde_json::to_string(&*BLANK_PLAYER).expect("blank");
        for slot in ["2", "3", "4", "5"] {
            assert_eq!(parsed[slot], blank);
        }
    }

    #[test]
    fn test_missing_special_ability_defaults_empty() {
        let mut state = character();
        state.abilities.retain(|a| a.slot_number != 0);
        let slot = SimPlayer::from_character(&state);
        assert_eq!(slot.abilities[0].ability_hrid, "");
        assert_eq!(slot.abilities[0].level, 1);
        assert_eq!(slot.abilities[1].ability_hrid, "/abilities/cleave");
    }

    #[test]
    fn test_milkonomy_field_spelling_preserved() {
        let export = MilkonomyExport::from_character(&character(), "Alice", "#00bfff");
        let json = serde_json::to_value(&export).expect("serialize");
        assert!(json.get("specialEquimentMap").is_some());
        assert!(json.get("specialEquipmentMap").is_none());
        assert_eq!(
            json["actionConfigMap"].as_object().map(|m| m.len()),
            Some(10)
        );
        assert_eq!(
            json["specialEquimentMap"].as_object().map(|m| m.len()),
            Some(8)
        );
        assert_eq!(
            json["communityBuffMap"].as_object().map(|m| m.len()),
            Some(4)
        );
    }

    #[test]
    fn test_character_sheet_url_segments() {
        let mut state = character();
        state.achievement_buffs = vec![AchievementBuff {
            action_type_hrid: "/action_types/combat".to_string(),
            buff_type_hrid: "/buff_types/damage".to_string(),
            flat_boost: 0.02,
        }];
        let url = build_character_sheet_url("https://sheet.example", &state);
        assert!(url.starts_with("https://sheet.example/?urpt="));
        let payload = url.split_once("?urpt=").expect("payload").1;
        let segments: Vec<&str> = payload.split(';').collect();
        assert_eq!(segments.len(), 7);
        assert!(segments[0].starts_with("Alice,"));
        // skills segment: 17 comma-separated levels, attack (3rd) = 70
        let skills: Vec<&str> = segments[1].split(',').collect();
        assert_eq!(skills.len(), 17);
        assert_eq!(skills[2], "70");
        assert!(segments[2].contains("/items/cheese_sword~5"));
        assert!(segments[3].starts_with("/abilities/vampirism~12,"));
        assert!(segments[5].contains("/house_rooms/dining_room~3"));
        assert!(segments[6].contains("/buff_types/damage"));
    }
}
