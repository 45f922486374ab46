//! Character data manager.
//!
//! Sole owner of the live [`CharacterState`]. Applies incremental patches
//! from inbound messages and emits lifecycle and domain events on the
//! bus. Consumers read snapshots through the getters and never mutate;
//! anything that depends on state being present must tolerate `None` and
//! retry on `character_initialized`.

use std::sync::{Arc, PoisonError, RwLock};

use toolasha_domain::{
    ActionDetail, ActionEntry, ActionHrid, BuffHrid, CharacterState, ClientData, ConsumableSlot,
    HouseRoom, HouseRoomHrid, InventoryItem, ItemDetail, ItemHrid, SkillState,
};
use toolasha_protocol::{Envelope, GameMessage, LootLogEntry, Quest, SharedProfile};

use crate::application::events::{EventBus, EventKind, EventPayload};
use crate::infrastructure::websocket::{Interceptor, SubscriptionHandle, WILDCARD};

pub struct DataManager {
    state: RwLock<Option<CharacterState>>,
    client_data: RwLock<Option<Arc<ClientData>>>,
    quests: RwLock<Vec<Quest>>,
    loot_log: RwLock<Vec<LootLogEntry>>,
    shared_profiles: RwLock<Vec<SharedProfile>>,
    bus: EventBus,
}

impl DataManager {
    pub fn new(bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(None),
            client_data: RwLock::new(None),
            quests: RwLock::new(Vec::new()),
            loot_log: RwLock::new(Vec::new()),
            shared_profiles: RwLock::new(Vec::new()),
            bus,
        })
    }

    /// Wire into the interceptor. Uses the wildcard and narrows on the
    /// typed message inside, so one subscription covers every type.
    pub fn attach(self: &Arc<Self>, interceptor: &Arc<Interceptor>) -> SubscriptionHandle {
        let manager = Arc::clone(self);
        interceptor.subscribe(
            WILDCARD,
            Arc::new(move |envelope| {
                manager.handle_message(envelope);
                Ok(())
            }),
        )
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // -------------------------------------------------------------------------
    // Message handling
    // -------------------------------------------------------------------------

    pub fn handle_message(&self, envelope: &Envelope) {
        let event = match &envelope.message {
            GameMessage::InitClientData(data) => {
                *self
                    .client_data
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::new(data.as_ref().clone()));
                Some(EventKind::ClientDataInitialized)
            }
            GameMessage::InitCharacterData(state) => {
                self.on_init_character_data(state.as_ref());
                None
            }
            GameMessage::CharacterUpdated { character } => {
                self.with_state(|state| state.character = character.clone());
                Some(EventKind::CharacterUpdated)
            }
            GameMessage::ItemsUpdated { items } => {
                let items = items.clone();
                self.with_state(|state| state.apply_items_update(items));
                Some(EventKind::ItemsUpdated)
            }
            GameMessage::ActionsUpdated { actions } => {
                let actions = actions.clone();
                self.with_state(|state| state.apply_actions_update(actions));
                Some(EventKind::ActionsUpdated)
            }
            GameMessage::SkillsUpdated { skills } => {
                let skills = skills.clone();
                self.with_state(|state| state.apply_skills_update(skills));
                Some(EventKind::SkillsUpdated)
            }
            GameMessage::NewBattle { .. } => Some(EventKind::NewBattle),
            GameMessage::ActionCompleted { .. } => Some(EventKind::ActionCompleted),
            GameMessage::BattleUnitFetched { .. } => Some(EventKind::BattleUnitFetched),
            GameMessage::BattleConsumableAbilityUpdated { abilities } => {
                // Self-only: patches the player's own loadout.
                let abilities = abilities.clone();
                self.with_state(|state| state.abilities = abilities);
                Some(EventKind::BattleConsumableAbilityUpdated)
            }
            GameMessage::ChatMessageReceived { .. } => Some(EventKind::ChatMessageReceived),
            GameMessage::QuestsUpdated { quests } => {
                *self.quests.write().unwrap_or_else(PoisonError::into_inner) = quests.clone();
                Some(EventKind::QuestsUpdated)
            }
            GameMessage::LootLogUpdated { loot_log } => {
                *self
                    .loot_log
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = loot_log.clone();
                Some(EventKind::LootLogUpdated)
            }
            GameMessage::HouseRoomsUpdated { house_room_map } => {
                let rooms = house_room_map.clone();
                self.with_state(|state| state.apply_house_rooms_update(rooms));
                Some(EventKind::HouseRoomsUpdated)
            }
            GameMessage::ConsumablesUpdated {
                action_type_food_slots_map,
                action_type_drink_slots_map,
            } => {
                let food = action_type_food_slots_map.clone();
                let drinks = action_type_drink_slots_map.clone();
                self.with_state(|state| state.apply_consumables_update(food, drinks));
                Some(EventKind::ConsumablesUpdated)
            }
            GameMessage::ProfileShared { profile } => {
                let mut profiles = self
                    .shared_profiles
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                profiles.retain(|p| p.character_name != profile.character_name);
                profiles.push(profile.clone());
                Some(EventKind::ProfileShared)
            }
            GameMessage::Other => None,
        };

        if let Some(kind) = event {
            self.bus.emit(
                kind,
                &EventPayload::Message(Arc::new(envelope.clone())),
            );
        }
    }

    fn on_init_character_data(&self, incoming: &CharacterState) {
        let previous_id = self.current_character_id();

        match previous_id {
            Some(previous) if previous == incoming.character.id => {
                // Reconciliation: the snapshot is authoritative, swap it in
                // without a lifecycle transition.
                *self.state.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(incoming.clone());
            }
            Some(previous) => {
                // Character switch: announce before the pointer swap, clear
                // per-character derived caches, then install the new state.
                self.bus.emit(
                    EventKind::CharacterSwitching,
                    &EventPayload::CharacterSwitching {
                        previous_id: previous,
                        next_id: incoming.character.id.clone(),
                    },
                );
                self.clear_derived_caches();
                *self.state.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(incoming.clone());
                self.bus.emit(
                    EventKind::CharacterInitialized,
                    &EventPayload::CharacterInitialized {
                        state: Arc::new(incoming.clone()),
                        is_character_switch: true,
                    },
                );
            }
            None => {
                *self.state.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(incoming.clone());
                self.bus.emit(
                    EventKind::CharacterInitialized,
                    &EventPayload::CharacterInitialized {
                        state: Arc::new(incoming.clone()),
                        is_character_switch: false,
                    },
                );
            }
        }
    }

    fn clear_derived_caches(&self) {
        self.quests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.loot_log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn with_state(&self, patch: impl FnOnce(&mut CharacterState)) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(state) => patch(state),
            // Updates before the first snapshot are dropped.
            None => tracing::debug!("update before character init; dropped"),
        }
    }

    // -------------------------------------------------------------------------
    // Read surface
    // -------------------------------------------------------------------------

    /// Snapshot of the current character state, if initialized.
    pub fn character_data(&self) -> Option<CharacterState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn current_character_id(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.character.id.clone())
    }

    pub fn current_character_name(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.character.name.clone())
    }

    pub fn init_client_data(&self) -> Option<Arc<ClientData>> {
        self.client_data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn inventory(&self) -> Vec<InventoryItem> {
        self.read_state(|s| s.inventory.clone()).unwrap_or_default()
    }

    pub fn equipment(&self) -> Vec<InventoryItem> {
        self.read_state(|s| s.equipment().into_values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn skills(&self) -> Vec<SkillState> {
        self.read_state(|s| s.skills.clone()).unwrap_or_default()
    }

    pub fn current_actions(&self) -> Vec<ActionEntry> {
        self.read_state(|s| s.actions.clone()).unwrap_or_default()
    }

    pub fn house_rooms(&self) -> Vec<(HouseRoomHrid, HouseRoom)> {
        self.read_state(|s| {
            s.house_room_map
                .iter()
                .map(|(hrid, room)| (hrid.clone(), room.clone()))
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn house_room_level(&self, room_hrid: &HouseRoomHrid) -> u32 {
        self.read_state(|s| s.house_room_level(room_hrid))
            .unwrap_or(0)
    }

    pub fn action_drink_slots(&self, action_type: &str) -> Vec<Option<ConsumableSlot>> {
        self.read_state(|s| {
            s.action_type_drink_slots_map
                .get(action_type)
                .cloned()
                .unwrap_or_default()
        })
        .unwrap_or_default()
    }

    pub fn community_buff_level(&self, buff_hrid: &BuffHrid) -> u32 {
        self.read_state(|s| s.community_buff_level(buff_hrid))
            .unwrap_or(0)
    }

    pub fn achievement_buff_flat_boost(&self, action_type: &str, buff_type: &str) -> f64 {
        self.read_state(|s| s.achievement_buff_flat_boost(action_type, buff_type))
            .unwrap_or(0.0)
    }

    pub fn quests(&self) -> Vec<Quest> {
        self.quests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn loot_log(&self) -> Vec<LootLogEntry> {
        self.loot_log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn shared_profile(&self, character_name: &str) -> Option<SharedProfile> {
        self.shared_profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.character_name == character_name)
            .cloned()
    }

    // Dictionary lookups

    pub fn item_details(&self, hrid: &ItemHrid) -> Option<ItemDetail> {
        self.init_client_data()?.item(hrid).cloned()
    }

    pub fn action_details(&self, hrid: &ActionHrid) -> Option<ActionDetail> {
        self.init_client_data()?.action(hrid).cloned()
    }

    pub fn monster_hrid_from_name(&self, name: &str) -> Option<String> {
        self.init_client_data()?
            .monster_hrid_from_name(name)
            .map(|s| s.to_string())
    }

    pub fn monster_sort_index(&self, hrid: &str) -> Option<u32> {
        self.init_client_data()?.monster_sort_index(hrid)
    }

    fn read_state<T>(&self, read: impl FnOnce(&CharacterState) -> T) -> Option<T> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(read)
    }
}
