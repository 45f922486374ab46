//! Full-stack harness with fake collaborators.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;

use crate::application::{DataManager, EventBus, MarketDataCache, SettingsService};
use crate::features::dungeon_tracker::DungeonTracker;
use crate::features::enhancement_tracker::EnhancementTracker;
use crate::features::exports::{CharacterSheetLink, CombatSimExportFeature, MilkonomyExportFeature};
use crate::features::{
    combat_stats::CombatStats, listing_age::ListingAge, task_profit::TaskProfitDisplay,
    tooltip_guard::TooltipGuard, Feature, FeatureContext, FeatureRegistry,
};
use crate::infrastructure::observer::UiObserver;
use crate::infrastructure::storage::DocumentStore;
use crate::infrastructure::testing::ManualClock;
use crate::infrastructure::websocket::Interceptor;
use crate::ports::outbound::{LoggingClipboard, MemoryOverlay, UiEvent};
use crate::workers::WorkerPool;

/// Shortened lifecycle delays so a full init + health check + retry
/// cycle fits in well under a second.
pub const TEST_HEALTH_DELAY: Duration = Duration::from_millis(40);
pub const TEST_RETRY_DELAY: Duration = Duration::from_millis(40);

/// Generous settle time for spawned lifecycle tasks.
pub const SETTLE: Duration = Duration::from_millis(250);

pub struct Harness {
    pub interceptor: Arc<Interceptor>,
    pub observer: Arc<UiObserver>,
    pub ui_tx: UnboundedSender<UiEvent>,
    pub store: Arc<DocumentStore>,
    pub bus: EventBus,
    pub data: Arc<DataManager>,
    pub settings: Arc<SettingsService>,
    pub market: Arc<MarketDataCache>,
    pub overlay: Arc<MemoryOverlay>,
    pub clipboard: Arc<LoggingClipboard>,
    pub clock: Arc<ManualClock>,
    pub registry: Arc<FeatureRegistry>,
    pub ctx: FeatureContext,

    pub dungeon_tracker: Arc<DungeonTracker>,
    pub enhancement_tracker: Arc<EnhancementTracker>,
    pub combat_sim_export: Arc<CombatSimExportFeature>,
    pub task_profit: Arc<TaskProfitDisplay>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_market_url("http://127.0.0.1:1/market.json").await
    }

    pub async fn with_market_url(market_url: &str) -> Self {
        let store = Arc::new(DocumentStore::open_in_memory().await.expect("store"));
        let observer = UiObserver::new();
        let (ui_tx, ui_rx) = tokio::sync::mpsc::unbounded_channel();
        let _ = observer.start(ui_rx);

        let bus = EventBus::new();
        let interceptor = Interceptor::new(Arc::clone(&store));
        let data = DataManager::new(bus.clone());
        // Handles do not auto-unsubscribe on drop; the wildcard
        // subscription lives for the harness lifetime.
        data.attach(&interceptor);

        let settings = SettingsService::new(Arc::clone(&store), bus.clone());
        let clock = Arc::new(ManualClock::new(base_time()));
        let market = MarketDataCache::new(
            market_url,
            Duration::from_secs(900),
            Arc::clone(&store),
            Arc::clone(&settings),
            clock.clone(),
        );
        let workers = WorkerPool::new(2);
        let overlay = Arc::new(MemoryOverlay::new());
        let clipboard = Arc::new(LoggingClipboard::new());

        let ctx = FeatureContext {
            interceptor: Arc::clone(&interceptor),
            observer: Arc::clone(&observer),
            data: Arc::clone(&data),
            settings: Arc::clone(&settings),
            market: Arc::clone(&market),
            store: Arc::clone(&store),
            overlay: overlay.clone(),
            clipboard: clipboard.clone(),
            clock: clock.clone(),
            workers,
        };

        let registry =
            FeatureRegistry::with_delays(ctx.clone(), TEST_HEALTH_DELAY, TEST_RETRY_DELAY);

        let dungeon_tracker = DungeonTracker::new();
        let enhancement_tracker = EnhancementTracker::new();
        let combat_sim_export = CombatSimExportFeature::new();
        let task_profit = TaskProfitDisplay::new();
        let features: Vec<Arc<dyn Feature>> = vec![
            task_profit.clone(),
            dungeon_tracker.clone(),
            enhancement_tracker.clone(),
            CombatStats::new(),
            ListingAge::new(),
            combat_sim_export.clone(),
            MilkonomyExportFeature::new(),
            CharacterSheetLink::new(),
            TooltipGuard::new(),
        ];
        registry.register_features(features).await;
        registry.setup();

        Self {
            interceptor,
            observer,
            ui_tx,
            store,
            bus,
            data,
            settings,
            market,
            overlay,
            clipboard,
            clock,
            registry,
            ctx,
            dungeon_tracker,
            enhancement_tracker,
            combat_sim_export,
            task_profit,
        }
    }

    /// Push one inbound text frame through the tap.
    pub async fn feed(&self, frame: &str) {
        self.interceptor.handle_frame(frame).await;
    }

    /// Boot: dictionary, then the character snapshot, then wait for the
    /// registry's spawned init cycle (incl. health check) to finish.
    pub async fn boot(&self, character_id: &str) {
        self.feed(&client_data_frame()).await;
        self.feed(&character_frame(character_id)).await;
        self.settle().await;
    }

    pub async fn settle(&self) {
        tokio::time::sleep(SETTLE).await;
    }

    pub fn advance_clock(&self, delta: chrono::TimeDelta) {
        self.clock.advance(delta);
    }
}

pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-10T12:00:00Z")
        .expect("base time")
        .with_timezone(&Utc)
}

/// Dictionary with one dungeon, one production chain, and a monster.
pub fn client_data_frame() -> String {
    r#"{
        "type": "init_client_data",
        "itemDetailMap": {
            "/items/cheese": {"hrid": "/items/cheese", "name": "Cheese", "sellPrice": 4},
            "/items/cheese_sword": {
                "hrid": "/items/cheese_sword",
                "name": "Cheese Sword",
                "itemLevel": 35,
                "craftingRecipe": {
                    "inputItems": [{"itemHrid": "/items/cheese", "count": 10.0}],
                    "outputCount": 1.0
                }
            },
            "/items/mirror_of_protection": {
                "hrid": "/items/mirror_of_protection",
                "name": "Mirror of Protection",
                "sellPrice": 100000
            },
            "/items/crystal": {"hrid": "/items/crystal", "name": "Crystal", "sellPrice": 0}
        },
        "actionDetailMap": {
            "/actions/combat/chimerical_den": {
                "hrid": "/actions/combat/chimerical_den",
                "name": "Chimerical Den",
                "type": "/action_types/combat",
                "combatZoneInfo": {
                    "isDungeon": true,
                    "dungeonInfo": {"maxWaves": 50}
                }
            },
            "/actions/cheesesmithing/cheese_sword": {
                "hrid": "/actions/cheesesmithing/cheese_sword",
                "name": "Cheese Sword",
                "type": "/action_types/cheesesmithing",
                "baseDurationSeconds": 20.0,
                "inputItems": [{"itemHrid": "/items/cheese", "count": 10.0}],
                "outputItems": [{"itemHrid": "/items/cheese_sword", "count": 1.0}]
            },
            "/actions/enhancing/enhance": {
                "hrid": "/actions/enhancing/enhance",
                "name": "Enhance",
                "type": "/action_types/enhancing",
                "inputItems": [{"itemHrid": "/items/cheese", "count": 2.0}]
            },
            "/actions/crafting/crystal_blade": {
                "hrid": "/actions/crafting/crystal_blade",
                "name": "Crystal Blade",
                "type": "/action_types/crafting",
                "baseDurationSeconds": 30.0,
                "inputItems": [{"itemHrid": "/items/crystal", "count": 2.0}],
                "outputItems": [{"itemHrid": "/items/crystal_blade", "count": 1.0}]
            }
        },
        "combatMonsterDetailMap": {
            "/monsters/chimera": {"hrid": "/monsters/chimera", "name": "Chimera", "sortIndex": 9}
        }
    }"#
    .to_string()
}

pub fn character_frame(character_id: &str) -> String {
    format!(
        r#"{{
            "type": "init_character_data",
            "character": {{"id": "{character_id}", "name": "Player-{character_id}"}},
            "skills": [
                {{"skillHrid": "/skills/attack", "level": 70, "experience": 100.0}},
                {{"skillHrid": "/skills/stamina", "level": 65, "experience": 100.0}}
            ],
            "inventory": [
                {{"itemHrid": "/items/cheese_sword", "itemLocationHrid": "/item_locations/main_hand", "enhancementLevel": 5, "count": 1}},
                {{"itemHrid": "/items/cheese", "itemLocationHrid": "/item_locations/inventory", "enhancementLevel": 0, "count": 100}}
            ],
            "actions": [],
            "houseRoomMap": {{"/house_rooms/dining_room": {{"level": 3}}}},
            "abilities": [
                {{"abilityHrid": "/abilities/vampirism", "level": 12, "slotNumber": 0}},
                {{"abilityHrid": "/abilities/cleave", "level": 8, "slotNumber": 1}}
            ],
            "partyInfo": {{
                "party": {{"id": "party-1"}},
                "partySlotMap": {{
                    "1": {{"characterId": "{character_id}", "characterName": "Alice"}},
                    "2": {{"characterId": "c-bob", "characterName": "Bob"}}
                }}
            }}
        }}"#
    )
}

/// The dungeon action running as the current action.
pub fn dungeon_actions_frame(is_done: bool, wave: Option<u32>) -> String {
    let wave_field = wave.map(|w| format!(r#", "wave": {w}"#)).unwrap_or_default();
    format!(
        r#"{{
            "type": "actions_updated",
            "actions": [{{
                "actionHrid": "/actions/combat/chimerical_den",
                "difficultyTier": 1,
                "isDone": {is_done},
                "maxCount": 0,
                "currentCount": 0{wave_field}
            }}]
        }}"#
    )
}

pub fn new_battle_frame(battle_id: &str, wave: u32) -> String {
    format!(
        r#"{{"type": "new_battle", "battleId": "{battle_id}", "wave": {wave}, "players": [
            {{"name": "Alice", "isPlayer": true}}, {{"name": "Bob", "isPlayer": true}}
        ]}}"#
    )
}

pub fn key_count_frame(counts: &str) -> String {
    format!(
        r#"{{"type": "chat_message_received", "message": {{
            "channelTypeHrid": "/chat_channel_types/party",
            "m": "systemChatMessage.partyKeyCount",
            "message": "Key count - {counts}"
        }}}}"#
    )
}

pub fn action_completed_frame(action_hrid: &str, is_done: bool, wave: u32) -> String {
    format!(
        r#"{{"type": "action_completed", "action": {{
            "actionHrid": "{action_hrid}",
            "isDone": {is_done},
            "wave": {wave}
        }}}}"#
    )
}
