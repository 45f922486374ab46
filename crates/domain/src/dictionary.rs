//! The static game dictionary.
//!
//! `init_client_data` carries the full game dictionary (item map, action
//! map, ability map, ...). Only the subset the calculators and trackers
//! actually read is modelled; unknown fields are ignored at parse time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::hrid::{AbilityHrid, ActionHrid, HouseRoomHrid, ItemHrid, SkillHrid};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCount {
    pub item_hrid: ItemHrid,
    pub count: f64,
}

/// Crafting recipe for a producible item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    #[serde(default)]
    pub input_items: Vec<ItemCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_item_hrid: Option<ItemHrid>,
    #[serde(default = "default_output_count")]
    pub output_count: f64,
}

fn default_output_count() -> f64 {
    1.0
}

/// One line of an openable container's drop table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropEntry {
    pub item_hrid: ItemHrid,
    pub drop_rate: f64,
    #[serde(default)]
    pub min_count: f64,
    #[serde(default)]
    pub max_count: f64,
}

impl DropEntry {
    /// Expected item count contributed by this line per single open.
    pub fn expected_count(&self) -> f64 {
        self.drop_rate * (self.min_count + self.max_count) / 2.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetail {
    pub hrid: ItemHrid,
    pub name: String,
    #[serde(default)]
    pub item_level: u32,
    /// Vendor coin price; 0 means the vendor does not sell it.
    #[serde(default)]
    pub sell_price: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crafting_recipe: Option<Recipe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_drop_table: Option<Vec<DropEntry>>,
}

impl ItemDetail {
    pub fn is_openable(&self) -> bool {
        self.open_drop_table
            .as_ref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonInfo {
    #[serde(default)]
    pub max_waves: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_item_hrid: Option<ItemHrid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatZoneInfo {
    #[serde(default)]
    pub is_dungeon: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dungeon_info: Option<DungeonInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDetail {
    pub hrid: ActionHrid,
    pub name: String,
    /// Action type HRID, e.g. `/action_types/cheesesmithing`.
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_hrid: Option<SkillHrid>,
    #[serde(default)]
    pub level_requirement: u32,
    #[serde(default)]
    pub base_duration_seconds: f64,
    #[serde(default)]
    pub experience_gain: f64,
    #[serde(default)]
    pub input_items: Vec<ItemCount>,
    #[serde(default)]
    pub output_items: Vec<ItemCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combat_zone_info: Option<CombatZoneInfo>,
}

impl ActionDetail {
    pub fn is_dungeon(&self) -> bool {
        self.combat_zone_info
            .as_ref()
            .map(|z| z.is_dungeon)
            .unwrap_or(false)
    }

    pub fn dungeon_max_waves(&self) -> Option<u32> {
        self.combat_zone_info
            .as_ref()
            .and_then(|z| z.dungeon_info.as_ref())
            .map(|d| d.max_waves)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityDetail {
    pub hrid: AbilityHrid,
    pub name: String,
    #[serde(default)]
    pub is_special_ability: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseRoomDetail {
    pub hrid: HouseRoomHrid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_hrid: Option<SkillHrid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonsterDetail {
    pub hrid: String,
    pub name: String,
    #[serde(default)]
    pub sort_index: u32,
}

/// The `init_client_data` dictionary subset Toolasha consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientData {
    #[serde(default)]
    pub item_detail_map: HashMap<ItemHrid, ItemDetail>,
    #[serde(default)]
    pub action_detail_map: HashMap<ActionHrid, ActionDetail>,
    #[serde(default)]
    pub ability_detail_map: HashMap<AbilityHrid, AbilityDetail>,
    #[serde(default)]
    pub house_room_detail_map: HashMap<HouseRoomHrid, HouseRoomDetail>,
    #[serde(default)]
    pub combat_monster_detail_map: HashMap<String, MonsterDetail>,
}

impl ClientData {
    pub fn item(&self, hrid: &ItemHrid) -> Option<&ItemDetail> {
        self.item_detail_map.get(hrid)
    }

    pub fn action(&self, hrid: &ActionHrid) -> Option<&ActionDetail> {
        self.action_detail_map.get(hrid)
    }

    /// Reverse lookup: monster HRID from its display name.
    pub fn monster_hrid_from_name(&self, name: &str) -> Option<&str> {
        self.combat_monster_detail_map
            .values()
            .find(|m| m.name == name)
            .map(|m| m.hrid.as_str())
    }

    pub fn monster_sort_index(&self, hrid: &str) -> Option<u32> {
        self.combat_monster_detail_map.get(hrid).map(|m| m.sort_index)
    }
}
