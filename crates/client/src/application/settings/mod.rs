//! Settings service.
//!
//! Values are persisted per character (`settings_<characterId>` in the
//! settings store) and resolved against the schema defaults. Changes fan
//! out synchronously to registered listeners after the write is applied.
//! Import and reset finish by requesting a lifecycle reload.

pub mod colors;
pub mod schema;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use uuid::Uuid;

use toolasha_domain::{SettingGroup, SettingType, SettingValue};

use crate::application::events::{EventBus, EventKind, EventPayload};
use crate::infrastructure::storage::{keys, DocumentStore};

pub use colors::ColorTokens;
pub use schema::setting_keys;

pub type SettingListener = Arc<dyn Fn(&SettingValue) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(Uuid);

type SettingsDoc = HashMap<String, SettingValue>;

pub struct SettingsService {
    store: Arc<DocumentStore>,
    bus: EventBus,
    character_id: RwLock<Option<String>>,
    values: RwLock<SettingsDoc>,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, SettingListener)>>>,
    colors: RwLock<ColorTokens>,
}

impl SettingsService {
    pub fn new(store: Arc<DocumentStore>, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            store,
            bus,
            character_id: RwLock::new(None),
            values: RwLock::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            colors: RwLock::new(ColorTokens::default()),
        })
    }

    pub fn schema(&self) -> &'static [SettingGroup] {
        &schema::SCHEMA
    }

    /// Load (or initialize) the settings document for a character and make
    /// it current. Registers the id in the known-characters set.
    pub async fn load_for_character(&self, character_id: &str) {
        let doc_key = keys::settings_doc_key(character_id);
        let stored: SettingsDoc = self
            .store
            .get_json(&doc_key, keys::SETTINGS)
            .await
            .unwrap_or_default();

        let mut resolved = HashMap::new();
        for group in schema::SCHEMA.iter() {
            for def in &group.settings {
                let value = stored.get(&def.key).cloned().unwrap_or_else(|| def.default.clone());
                resolved.insert(def.key.clone(), value);
            }
        }

        *self
            .character_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(character_id.to_string());
        *self.values.write().unwrap_or_else(PoisonError::into_inner) = resolved;
        self.recompute_colors();

        let mut known: Vec<String> = self
            .store
            .get_json(keys::KEY_KNOWN_CHARACTERS, keys::SETTINGS)
            .await
            .unwrap_or_default();
        if !known.iter().any(|id| id == character_id) {
            known.push(character_id.to_string());
            self.store
                .set_json(keys::KEY_KNOWN_CHARACTERS, &known, keys::SETTINGS, false)
                .await;
        }
    }

    pub fn current_character_id(&self) -> Option<String> {
        self.character_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Current value, falling back to the schema default for untouched
    /// keys. `None` only for unrecognized keys.
    pub fn get(&self, key: &str) -> Option<SettingValue> {
        if let Some(value) = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Some(value.clone());
        }
        schema::find_def(key).map(|def| def.default.clone())
    }

    pub fn is_true(&self, key: &str) -> bool {
        self.get(key).map(|v| v.is_true()).unwrap_or(false)
    }

    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(|s| s.to_string()))
    }

    /// Dependency-aware activation: a setting is only acted on when its
    /// dependency clause holds (and, for toggles, it is on). Settings
    /// marked `not_implemented` are never active.
    pub fn is_active(&self, key: &str) -> bool {
        let Some(def) = schema::find_def(key) else {
            return false;
        };
        if def.not_implemented {
            return false;
        }
        if let Some(deps) = &def.dependencies {
            if !deps.is_satisfied(|dep| self.is_true(dep)) {
                return false;
            }
        }
        match def.setting_type {
            SettingType::Checkbox => self.is_true(key),
            _ => true,
        }
    }

    pub fn colors(&self) -> ColorTokens {
        self.colors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn known_characters(&self) -> Vec<String> {
        self.store
            .get_json(keys::KEY_KNOWN_CHARACTERS, keys::SETTINGS)
            .await
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Set a value for the current character. Returns false for unknown
    /// keys or when no character is loaded. Listeners run synchronously
    /// after the write is applied.
    pub fn set(&self, key: &str, value: SettingValue) -> bool {
        let Some(def) = schema::find_def(key) else {
            tracing::warn!(key, "rejecting write to unrecognized setting");
            return false;
        };
        {
            let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
            values.insert(key.to_string(), value.clone());
        }
        if !self.persist_current() {
            return false;
        }
        if def.setting_type == SettingType::Color {
            self.recompute_colors();
        }
        self.notify(key, &value);
        true
    }

    fn persist_current(&self) -> bool {
        let Some(character_id) = self.current_character_id() else {
            tracing::debug!("settings write before character load; kept in memory only");
            return true;
        };
        let doc = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.store
            .set_json_deferred(&keys::settings_doc_key(&character_id), &doc, keys::SETTINGS)
    }

    fn notify(&self, key: &str, value: &SettingValue) {
        let snapshot: Vec<(ListenerId, SettingListener)> = {
            let listeners = self
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            listeners.get(key).cloned().unwrap_or_default()
        };
        for (id, listener) in snapshot {
            if let Err(e) = listener(value) {
                tracing::warn!(key, listener = ?id, "setting listener failed: {e}");
            }
        }
    }

    pub fn on_setting_change(&self, key: &str, listener: SettingListener) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.entry(key.to_string()).or_default().push((id, listener));
        id
    }

    pub fn off_setting_change(&self, key: &str, id: ListenerId) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = listeners.get_mut(key) {
            list.retain(|(listener_id, _)| *listener_id != id);
        }
    }

    fn recompute_colors(&self) {
        let read = |key: &str, default: &str| {
            self.get(key)
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .unwrap_or_else(|| default.to_string())
        };
        let tokens = ColorTokens {
            accent: read(setting_keys::COLOR_ACCENT, colors::DEFAULT_ACCENT),
            text_primary: read(setting_keys::COLOR_TEXT_PRIMARY, colors::DEFAULT_TEXT_PRIMARY),
            main: read(setting_keys::COLOR_MAIN, colors::DEFAULT_MAIN),
        };
        *self.colors.write().unwrap_or_else(PoisonError::into_inner) = tokens;
    }

    // -------------------------------------------------------------------------
    // Bulk operations
    // -------------------------------------------------------------------------

    /// Copy the current character's settings to every known character.
    pub async fn sync_to_all_characters(&self) -> usize {
        let doc = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut written = 0;
        for character_id in self.known_characters().await {
            if self
                .store
                .set_json(
                    &keys::settings_doc_key(&character_id),
                    &doc,
                    keys::SETTINGS,
                    true,
                )
                .await
            {
                written += 1;
            }
        }
        written
    }

    /// Export the current document as the import/export JSON blob.
    pub fn export_json(&self) -> Option<String> {
        let doc = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        serde_json::to_string(&doc).ok()
    }

    /// Import a previously exported blob. Unknown keys are dropped.
    /// Finishes by requesting a lifecycle reload.
    pub async fn import_json(&self, json: &str) -> anyhow::Result<()> {
        let incoming: SettingsDoc = serde_json::from_str(json)?;
        let filtered: SettingsDoc = incoming
            .into_iter()
            .filter(|(key, _)| schema::find_def(key).is_some())
            .collect();
        {
            let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
            for group in schema::SCHEMA.iter() {
                for def in &group.settings {
                    let value = filtered
                        .get(&def.key)
                        .cloned()
                        .unwrap_or_else(|| def.default.clone());
                    values.insert(def.key.clone(), value);
                }
            }
        }
        if let Some(character_id) = self.current_character_id() {
            let doc = self
                .values
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            self.store
                .set_json(&keys::settings_doc_key(&character_id), &doc, keys::SETTINGS, true)
                .await;
        }
        self.recompute_colors();
        self.bus.emit(EventKind::ReloadRequested, &EventPayload::None);
        Ok(())
    }

    /// Restore schema defaults. Finishes by requesting a lifecycle reload.
    pub async fn reset(&self) {
        {
            let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
            values.clear();
            for group in schema::SCHEMA.iter() {
                for def in &group.settings {
                    values.insert(def.key.clone(), def.default.clone());
                }
            }
        }
        if let Some(character_id) = self.current_character_id() {
            let doc = self
                .values
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            self.store
                .set_json(&keys::settings_doc_key(&character_id), &doc, keys::SETTINGS, true)
                .await;
        }
        self.recompute_colors();
        self.bus.emit(EventKind::ReloadRequested, &EventPayload::None);
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn service() -> Arc<SettingsService> {
        let store = Arc::new(DocumentStore::open_in_memory().await.expect("store"));
        let service = SettingsService::new(store, EventBus::new());
        service.load_for_character("C1").await;
        service
    }

    #[tokio::test]
    async fn test_defaults_resolved_from_schema() {
        let service = service().await;
        assert!(service.is_true(setting_keys::DUNGEON_TRACKER));
        assert_eq!(
            service.get_text(setting_keys::PRICING_MODE_PROFIT).as_deref(),
            Some("ask")
        );
    }

    #[tokio::test]
    async fn test_set_persists_per_character() {
        let store = Arc::new(DocumentStore::open_in_memory().await.expect("store"));
        let service = SettingsService::new(Arc::clone(&store), EventBus::new());
        service.load_for_character("C1").await;

        assert!(service.set(setting_keys::DUNGEON_TRACKER, SettingValue::toggle(false)));
        store.flush_all().await;

        // A different character still sees the default.
        service.load_for_character("C2").await;
        assert!(service.is_true(setting_keys::DUNGEON_TRACKER));
        // Back to C1: the write survived.
        service.load_for_character("C1").await;
        assert!(!service.is_true(setting_keys::DUNGEON_TRACKER));
    }

    #[tokio::test]
    async fn test_change_listeners_fire_synchronously() {
        let service = service().await;
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = Arc::clone(&count);
        let id = service.on_setting_change(
            setting_keys::TASK_PROFIT_DISPLAY,
            Arc::new(move |value| {
                assert!(!value.is_true());
                count_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        service.set(setting_keys::TASK_PROFIT_DISPLAY, SettingValue::toggle(false));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        service.off_setting_change(setting_keys::TASK_PROFIT_DISPLAY, id);
        service.set(setting_keys::TASK_PROFIT_DISPLAY, SettingValue::toggle(true));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dependency_gating() {
        let service = service().await;
        assert!(service.is_active(setting_keys::DUNGEON_TRACKER_BACKFILL));
        service.set(setting_keys::DUNGEON_TRACKER, SettingValue::toggle(false));
        assert!(!service.is_active(setting_keys::DUNGEON_TRACKER_BACKFILL));
    }

    #[tokio::test]
    async fn test_not_implemented_is_never_active() {
        let service = service().await;
        service.set(setting_keys::PARTY_DPS_METER, SettingValue::toggle(true));
        assert!(!service.is_active(setting_keys::PARTY_DPS_METER));
    }

    #[tokio::test]
    async fn test_export_import_round_trip() {
        let service = service().await;
        service.set(setting_keys::COMBAT_STATS, SettingValue::toggle(false));
        let exported = service.export_json().expect("export");

        service.reset().await;
        assert!(service.is_true(setting_keys::COMBAT_STATS));

        service.import_json(&exported).await.expect("import");
        assert!(!service.is_true(setting_keys::COMBAT_STATS));
        // Compare as values; JSON map ordering is not stable.
        let reexported: serde_json::Value =
            serde_json::from_str(&service.export_json().expect("re-export")).expect("parse");
        let original: serde_json::Value = serde_json::from_str(&exported).expect("parse");
        assert_eq!(reexported, original);
    }

    #[tokio::test]
    async fn test_import_requests_reload() {
        let store = Arc::new(DocumentStore::open_in_memory().await.expect("store"));
        let bus = EventBus::new();
        let reloads = Arc::new(AtomicU32::new(0));
        let reloads_clone = Arc::clone(&reloads);
        bus.on(
            EventKind::ReloadRequested,
            Arc::new(move |_| {
                reloads_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        let service = SettingsService::new(store, bus);
        service.load_for_character("C1").await;

        service.import_json("{}").await.expect("import");
        service.reset().await;
        assert_eq!(reloads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sync_to_all_characters() {
        let store = Arc::new(DocumentStore::open_in_memory().await.expect("store"));
        let service = SettingsService::new(Arc::clone(&store), EventBus::new());
        service.load_for_character("C1").await;
        service.load_for_character("C2").await;
        service.load_for_character("C1").await;
        service.set(setting_keys::MILKONOMY_EXPORT, SettingValue::toggle(false));

        let written = service.sync_to_all_characters().await;
        assert_eq!(written, 2);

        service.load_for_character("C2").await;
        assert!(!service.is_true(setting_keys::MILKONOMY_EXPORT));
    }

    #[tokio::test]
    async fn test_color_tokens_recomputed() {
        let service = service().await;
        assert_eq!(service.colors().accent, colors::DEFAULT_ACCENT);
        service.set(setting_keys::COLOR_ACCENT, SettingValue::text("#ff0000"));
        assert_eq!(service.colors().accent, "#ff0000");
    }
}
