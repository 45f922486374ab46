//! Synchronous event bus.
//!
//! Handlers are registered per event kind and invoked synchronously, in
//! registration order, each behind a log-and-continue error wall. The
//! string surface of each kind matches the persisted/logged event names.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use toolasha_domain::CharacterState;
use toolasha_protocol::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ClientDataInitialized,
    CharacterInitialized,
    CharacterSwitching,
    CharacterUpdated,
    ItemsUpdated,
    ActionsUpdated,
    SkillsUpdated,
    NewBattle,
    ActionCompleted,
    BattleUnitFetched,
    BattleConsumableAbilityUpdated,
    ChatMessageReceived,
    QuestsUpdated,
    LootLogUpdated,
    HouseRoomsUpdated,
    ConsumablesUpdated,
    ProfileShared,
    /// Settings import/reset finished; the lifecycle should restart.
    ReloadRequested,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientDataInitialized => "client_data_initialized",
            Self::CharacterInitialized => "character_initialized",
            Self::CharacterSwitching => "character_switching",
            Self::CharacterUpdated => "character_updated",
            Self::ItemsUpdated => "items_updated",
            Self::ActionsUpdated => "actions_updated",
            Self::SkillsUpdated => "skills_updated",
            Self::NewBattle => "new_battle",
            Self::ActionCompleted => "action_completed",
            Self::BattleUnitFetched => "battle_unit_fetched",
            Self::BattleConsumableAbilityUpdated => "battle_consumable_ability_updated",
            Self::ChatMessageReceived => "chat_message_received",
            Self::QuestsUpdated => "quests_updated",
            Self::LootLogUpdated => "loot_log_updated",
            Self::HouseRoomsUpdated => "house_rooms_updated",
            Self::ConsumablesUpdated => "consumables_updated",
            Self::ProfileShared => "profile_shared",
            Self::ReloadRequested => "reload_requested",
        }
    }
}

#[derive(Debug, Clone)]
pub enum EventPayload {
    /// First full state for a character id. `is_character_switch` is set
    /// when this follows a `CharacterSwitching` rather than first login.
    CharacterInitialized {
        state: Arc<CharacterState>,
        is_character_switch: bool,
    },
    /// Emitted before the state pointer is swapped.
    CharacterSwitching {
        previous_id: String,
        next_id: String,
    },
    /// Domain events carry the triggering frame.
    Message(Arc<Envelope>),
    None,
}

pub type EventHandler = Arc<dyn Fn(&EventPayload) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(Uuid);

/// Push-based bus: cheap to clone, handlers persist until removed.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<HashMap<EventKind, Vec<(HandlerId, EventHandler)>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, kind: EventKind, handler: EventHandler) -> HandlerId {
        let id = HandlerId(Uuid::new_v4());
        let mut handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        handlers.entry(kind).or_default().push((id, handler));
        id
    }

    /// Remove a handler; unknown ids are a no-op.
    pub fn off(&self, kind: EventKind, id: HandlerId) {
        let mut handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = handlers.get_mut(&kind) {
            list.retain(|(handler_id, _)| *handler_id != id);
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Invoke handlers synchronously in registration order. The handler
    /// list is snapshotted first so handlers may (un)subscribe reentrantly.
    pub fn emit(&self, kind: EventKind, payload: &EventPayload) {
        let snapshot: Vec<(HandlerId, EventHandler)> = {
            let handlers = self
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            handlers.get(&kind).cloned().unwrap_or_default()
        };
        for (id, handler) in snapshot {
            if let Err(e) = handler(payload) {
                tracing::warn!(event = kind.as_str(), handler = ?id, "event handler failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_emit_invokes_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            bus.on(
                EventKind::SkillsUpdated,
                Arc::new(move |_| {
                    order.lock().expect("lock").push(label);
                    Ok(())
                }),
            );
        }
        bus.emit(EventKind::SkillsUpdated, &EventPayload::None);
        assert_eq!(*order.lock().expect("lock"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_off_removes_handler() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = Arc::clone(&count);
        let id = bus.on(
            EventKind::SkillsUpdated,
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        bus.emit(EventKind::SkillsUpdated, &EventPayload::None);
        bus.off(EventKind::SkillsUpdated, id);
        bus.emit(EventKind::SkillsUpdated, &EventPayload::None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_handler_does_not_block_later_ones() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        bus.on(
            EventKind::NewBattle,
            Arc::new(|_| Err(anyhow::anyhow!("boom"))),
        );
        let count_clone = Arc::clone(&count);
        bus.on(
            EventKind::NewBattle,
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        bus.emit(EventKind::NewBattle, &EventPayload::None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_kinds_are_isolated() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = Arc::clone(&count);
        bus.on(
            EventKind::ItemsUpdated,
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        bus.emit(EventKind::SkillsUpdated, &EventPayload::None);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
