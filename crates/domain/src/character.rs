//! The character projection.
//!
//! `CharacterState` is the authoritative in-memory view of the player,
//! assembled by the Data Manager from inbound messages. Exactly one exists
//! at a time; a character switch tears the old one down before the new one
//! is installed. Consumers read snapshots and never mutate.
//!
//! Merge semantics live here so they can be unit-tested without the
//! message plumbing:
//! - inventory updates replace-by-slot-key, count 0 removes the slot
//! - action updates replace the whole queue (the game sends the full queue)
//! - skill updates patch in place, never remove

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::hrid::{AbilityHrid, ActionHrid, BuffHrid, HouseRoomHrid, ItemHrid, SkillHrid};

/// Identity block of the `init_character_data` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar_hrid: String,
    #[serde(default)]
    pub outfit_hrid: String,
    #[serde(default)]
    pub chat_icon_hrid: String,
    #[serde(default)]
    pub chat_border_color_hrid: String,
}

/// One skill line. Never removed once observed; level is non-decreasing
/// over the lifetime of a `CharacterState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillState {
    pub skill_hrid: SkillHrid,
    pub level: u32,
    #[serde(default)]
    pub experience: f64,
}

/// One inventory slot. A slot is uniquely identified by
/// `(item_hrid, item_location_hrid, enhancement_level)`; equipped items
/// appear with non-inventory location HRIDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub item_hrid: ItemHrid,
    pub item_location_hrid: String,
    #[serde(default)]
    pub enhancement_level: u8,
    pub count: i64,
}

impl InventoryItem {
    /// Slot identity used for replace-by-key merges.
    pub fn slot_key(&self) -> (&str, &str, u8) {
        (
            self.item_hrid.as_str(),
            &self.item_location_hrid,
            self.enhancement_level,
        )
    }

    /// Whether this slot sits in the shared inventory (as opposed to an
    /// equipment slot).
    pub fn is_in_inventory(&self) -> bool {
        self.item_location_hrid == "/item_locations/inventory"
    }
}

/// One queued or running action. Insertion order is execution order;
/// `actions[0]` is the currently executing action if any is executing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntry {
    pub action_hrid: ActionHrid,
    #[serde(default)]
    pub difficulty_tier: u8,
    #[serde(default)]
    pub is_done: bool,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub max_count: i64,
    #[serde(default)]
    pub current_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhancement_level: Option<u8>,
    /// Enhancing actions only: the item being enhanced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_item_hrid: Option<ItemHrid>,
    /// Enhancing actions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_level: Option<u8>,
    /// Enhancing actions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protect_from_level: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseRoom {
    pub level: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityBuff {
    pub level: u32,
}

/// Flat boost granted by an achievement, keyed by action type and buff type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementBuff {
    pub action_type_hrid: String,
    pub buff_type_hrid: String,
    pub flat_boost: f64,
}

/// An item reference inside a consumable loadout slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumableSlot {
    pub item_hrid: ItemHrid,
}

/// An equipped ability. Slot 0 is the special ability; slots 1..4 are the
/// normal rotation in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityState {
    pub ability_hrid: AbilityHrid,
    pub level: u32,
    pub slot_number: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_character_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartySlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyInfo {
    pub party: Party,
    #[serde(default)]
    pub party_slot_map: HashMap<String, PartySlot>,
}

impl PartyInfo {
    /// Names of everyone currently seated, unsorted.
    pub fn member_names(&self) -> Vec<String> {
        self.party_slot_map
            .values()
            .filter_map(|slot| slot.character_name.clone())
            .collect()
    }
}

/// The authoritative projection of the player's state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterState {
    pub character: CharacterInfo,
    #[serde(default)]
    pub skills: Vec<SkillState>,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
    #[serde(default)]
    pub house_room_map: HashMap<HouseRoomHrid, HouseRoom>,
    #[serde(default)]
    pub community_buff_map: HashMap<BuffHrid, CommunityBuff>,
    #[serde(default)]
    pub achievement_buffs: Vec<AchievementBuff>,
    #[serde(default)]
    pub action_type_food_slots_map: HashMap<String, Vec<Option<ConsumableSlot>>>,
    #[serde(default)]
    pub action_type_drink_slots_map: HashMap<String, Vec<Option<ConsumableSlot>>>,
    #[serde(default)]
    pub abilities: Vec<AbilityState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_info: Option<PartyInfo>,
}

impl CharacterState {
    pub fn character_id(&self) -> &str {
        &self.character.id
    }

    /// Derived equipment view: equipment-slot location HRID to the slot
    /// currently in it. Inventory and non-equipment locations are excluded.
    pub fn equipment(&self) -> HashMap<String, &InventoryItem> {
        self.inventory
            .iter()
            .filter(|item| !item.is_in_inventory() && item.count > 0)
            .map(|item| (item.item_location_hrid.clone(), item))
            .collect()
    }

    /// The currently executing action, if any.
    pub fn current_action(&self) -> Option<&ActionEntry> {
        self.actions.first().filter(|a| !a.is_done)
    }

    pub fn skill_level(&self, skill_hrid: &SkillHrid) -> u32 {
        self.skills
            .iter()
            .find(|s| &s.skill_hrid == skill_hrid)
            .map(|s| s.level)
            .unwrap_or(0)
    }

    pub fn house_room_level(&self, room_hrid: &HouseRoomHrid) -> u32 {
        self.house_room_map
            .get(room_hrid)
            .map(|r| r.level)
            .unwrap_or(0)
    }

    pub fn community_buff_level(&self, buff_hrid: &BuffHrid) -> u32 {
        self.community_buff_map
            .get(buff_hrid)
            .map(|b| b.level)
            .unwrap_or(0)
    }

    /// Flat achievement boost for an (action type, buff type) pair, summed
    /// over every matching achievement.
    pub fn achievement_buff_flat_boost(&self, action_type: &str, buff_type: &str) -> f64 {
        self.achievement_buffs
            .iter()
            .filter(|b| b.action_type_hrid == action_type && b.buff_type_hrid == buff_type)
            .map(|b| b.flat_boost)
            .sum()
    }

    /// The equipped special ability (slot 0), if any.
    pub fn special_ability(&self) -> Option<&AbilityState> {
        self.abilities.iter().find(|a| a.slot_number == 0)
    }

    /// The normal abilities in slot order.
    pub fn normal_abilities(&self) -> Vec<&AbilityState> {
        let mut slots: Vec<&AbilityState> =
            self.abilities.iter().filter(|a| a.slot_number > 0).collect();
        slots.sort_by_key(|a| a.slot_number);
        slots
    }

    // -------------------------------------------------------------------------
    // Merge operations (applied by the Data Manager)
    // -------------------------------------------------------------------------

    /// Replace-by-key inventory merge. Slots with count 0 are removed.
    pub fn apply_items_update(&mut self, items: Vec<InventoryItem>) {
        for incoming in items {
            let key = (
                incoming.item_hrid.as_str().to_string(),
                incoming.item_location_hrid.clone(),
                incoming.enhancement_level,
            );
            self.inventory.retain(|existing| {
                let existing_key = existing.slot_key();
                (existing_key.0, existing_key.1, existing_key.2)
                    != (key.0.as_str(), key.1.as_str(), key.2)
            });
            if incoming.count > 0 {
                self.inventory.push(incoming);
            }
        }
    }

    /// The game always sends the full queue; replace it wholesale.
    pub fn apply_actions_update(&mut self, actions: Vec<ActionEntry>) {
        self.actions = actions;
    }

    /// Patch skills in place. Skills are never removed once observed.
    pub fn apply_skills_update(&mut self, skills: Vec<SkillState>) {
        for incoming in skills {
            match self
                .skills
                .iter_mut()
                .find(|s| s.skill_hrid == incoming.skill_hrid)
            {
                Some(existing) => *existing = incoming,
                None => self.skills.push(incoming),
            }
        }
    }

    pub fn apply_house_rooms_update(&mut self, rooms: HashMap<HouseRoomHrid, HouseRoom>) {
        for (hrid, room) in rooms {
            self.house_room_map.insert(hrid, room);
        }
    }

    pub fn apply_consumables_update(
        &mut self,
        food: HashMap<String, Vec<Option<ConsumableSlot>>>,
        drinks: HashMap<String, Vec<Option<ConsumableSlot>>>,
    ) {
        for (action_type, slots) in food {
            self.action_type_food_slots_map.insert(action_type, slots);
        }
        for (action_type, slots) in drinks {
            self.action_type_drink_slots_map.insert(action_type, slots);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(item: &str, location: &str, level: u8, count: i64) -> InventoryItem {
        InventoryItem {
            item_hrid: ItemHrid::new(item),
            item_location_hrid: location.to_string(),
            enhancement_level: level,
            count,
        }
    }

    #[test]
    fn test_items_update_replaces_by_slot_key() {
        let mut state = CharacterState::default();
        state.apply_items_update(vec![slot("/items/cheese", "/item_locations/inventory", 0, 5)]);
        state.apply_items_update(vec![slot(
            "/items/cheese",
            "/item_locations/inventory",
            0,
            12,
        )]);

        assert_eq!(state.inventory.len(), 1);
        assert_eq!(state.inventory[0].count, 12);
    }

    #[test]
    fn test_items_update_zero_count_removes_slot() {
        let mut state = CharacterState::default();
        state.apply_items_update(vec![slot("/items/cheese", "/item_locations/inventory", 0, 5)]);
        state.apply_items_update(vec![slot("/items/cheese", "/item_locations/inventory", 0, 0)]);

        assert!(state.inventory.is_empty());
    }

    #[test]
    fn test_items_update_enhancement_level_distinguishes_slots() {
        let mut state = CharacterState::default();
        state.apply_items_update(vec![
            slot("/items/cheese_sword", "/item_locations/inventory", 0, 1),
            slot("/items/cheese_sword", "/item_locations/inventory", 3, 1),
        ]);

        assert_eq!(state.inventory.len(), 2);
    }

    #[test]
    fn test_equipment_view_excludes_inventory() {
        let mut state = CharacterState::default();
        state.apply_items_update(vec![
            slot("/items/cheese_sword", "/item_locations/main_hand", 2, 1),
            slot("/items/cheese", "/item_locations/inventory", 0, 40),
        ]);

        let equipment = state.equipment();
        assert_eq!(equipment.len(), 1);
        assert_eq!(
            equipment["/item_locations/main_hand"].item_hrid.as_str(),
            "/items/cheese_sword"
        );
    }

    #[test]
    fn test_actions_update_replaces_queue() {
        let mut state = CharacterState::default();
        state.apply_actions_update(vec![ActionEntry {
            action_hrid: ActionHrid::new("/actions/milking/cow"),
            difficulty_tier: 0,
            is_done: false,
            count: 0,
            max_count: 10,
            current_count: 0,
            wave: None,
            enhancement_level: None,
            primary_item_hrid: None,
            target_level: None,
            protect_from_level: None,
        }]);
        state.apply_actions_update(vec![]);
        assert!(state.actions.is_empty());
        assert!(state.current_action().is_none());
    }

    #[test]
    fn test_skills_update_patches_in_place() {
        let mut state = CharacterState::default();
        state.apply_skills_update(vec![SkillState {
            skill_hrid: SkillHrid::new("/skills/milking"),
            level: 10,
            experience: 100.0,
        }]);
        state.apply_skills_update(vec![SkillState {
            skill_hrid: SkillHrid::new("/skills/milking"),
            level: 11,
            experience: 150.0,
        }]);

        assert_eq!(state.skills.len(), 1);
        assert_eq!(state.skill_level(&SkillHrid::new("/skills/milking")), 11);
    }

    #[test]
    fn test_special_and_normal_abilities() {
        let mut state = CharacterState::default();
        state.abilities = vec![
            AbilityState {
                ability_hrid: AbilityHrid::new("/abilities/sweep"),
                level: 5,
                slot_number: 2,
            },
            AbilityState {
                ability_hrid: AbilityHrid::new("/abilities/vampirism"),
                level: 12,
                slot_number: 0,
            },
            AbilityState {
                ability_hrid: AbilityHrid::new("/abilities/cleave"),
                level: 3,
                slot_number: 1,
            },
        ];

        assert_eq!(
            state.special_ability().map(|a| a.ability_hrid.as_str()),
            Some("/abilities/vampirism")
        );
        let normals: Vec<&str> = state
            .normal_abilities()
            .iter()
            .map(|a| a.ability_hrid.as_str())
            .collect();
        assert_eq!(normals, vec!["/abilities/cleave", "/abilities/sweep"]);
    }
}
