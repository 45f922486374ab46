//! Toolasha - companion instrumentation for Milky Way Idle.
//!
//! Composition root: wires the socket tap, UI observer, document store,
//! settings, data manager, market cache, worker pool, and the feature
//! set, then attaches to the game socket until shutdown. Boot order
//! mirrors the runtime dependency order: the observer and store come up
//! before the interceptor starts handing frames to the data manager, the
//! registry installs its lifecycle hooks before the first
//! `init_character_data` can arrive, and market data is only fetched on
//! first consumer demand.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toolasha_client::application::{DataManager, EventBus, MarketDataCache, SettingsService};
use toolasha_client::features::dungeon_tracker::DungeonTracker;
use toolasha_client::features::enhancement_tracker::EnhancementTracker;
use toolasha_client::features::exports::{
    CharacterSheetLink, CombatSimExportFeature, MilkonomyExportFeature,
};
use toolasha_client::features::{
    combat_stats::CombatStats, listing_age::ListingAge, task_profit::TaskProfitDisplay,
    tooltip_guard::TooltipGuard, Feature, FeatureContext, FeatureRegistry,
};
use toolasha_client::infrastructure::observer::UiObserver;
use toolasha_client::infrastructure::storage::DocumentStore;
use toolasha_client::infrastructure::websocket::{GameSocket, Interceptor};
use toolasha_client::ports::outbound::{LoggingClipboard, MemoryOverlay, SystemClock, UiEvent};
use toolasha_client::workers::WorkerPool;
use toolasha_client::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolasha=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Toolasha");

    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Game socket: {}", config.game_ws_url);
    tracing::info!("  Market snapshot: {}", config.market_url);
    tracing::info!("  Data dir: {}", config.data_dir.display());

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(
        DocumentStore::open_at(&config.data_dir.join("toolasha.db"), config.flush_window).await?,
    );

    // UI observer pump. The host bridge owns the sender half and feeds
    // mutation batches, visibility changes, and scroll events into it.
    let observer = UiObserver::new();
    let (ui_tx, ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    let _pump = observer.start(ui_rx);

    let bus = EventBus::new();
    let interceptor = Interceptor::new(Arc::clone(&store));
    let data = DataManager::new(bus.clone());
    let _data_subscription = data.attach(&interceptor);

    let settings = SettingsService::new(Arc::clone(&store), bus.clone());
    let clock = Arc::new(SystemClock);
    let market = MarketDataCache::new(
        config.market_url.clone(),
        config.market_ttl,
        Arc::clone(&store),
        Arc::clone(&settings),
        clock.clone(),
    );
    if market.load_persisted().await {
        tracing::info!("market snapshot restored from storage");
    }

    let workers = WorkerPool::new(WorkerPool::default_size());
    tracing::info!("worker pool started with {} workers", workers.size());

    let overlay = Arc::new(MemoryOverlay::new());
    let clipboard = Arc::new(LoggingClipboard::new());

    let ctx = FeatureContext {
        interceptor: Arc::clone(&interceptor),
        observer: Arc::clone(&observer),
        data: Arc::clone(&data),
        settings: Arc::clone(&settings),
        market: Arc::clone(&market),
        store: Arc::clone(&store),
        overlay,
        clipboard,
        clock,
        workers,
    };

    let registry = FeatureRegistry::new(ctx);
    let features: Vec<Arc<dyn Feature>> = vec![
        TaskProfitDisplay::new(),
        DungeonTracker::new(),
        EnhancementTracker::new(),
        CombatStats::new(),
        ListingAge::new(),
        CombatSimExportFeature::new(),
        MilkonomyExportFeature::new(),
        CharacterSheetLink::new(),
        TooltipGuard::new(),
    ];
    registry.register_features(features).await;
    registry.setup();

    // Reload path: the game restores its dictionary from local state and
    // will not re-send it over the wire.
    interceptor.scan_cached_client_data().await;

    let socket = GameSocket::new(config.game_ws_url.clone(), Arc::clone(&interceptor));
    tokio::select! {
        result = socket.connect() => {
            if let Err(e) = result {
                tracing::error!("game socket ended: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    // Keep the bridge sender alive until shutdown.
    drop(ui_tx);

    registry.disable_all().await;
    if !store.flush_all().await {
        tracing::warn!("final flush failed; recent writes may be lost");
    }
    Ok(())
}
