//! Feature modules and their lifecycle.
//!
//! Every feature implements [`Feature`]: `initialize` wires subscriptions
//! and overlays, `disable` tears everything down idempotently, and all
//! resources are acquired through the feature's [`FeatureResources`] so
//! cleanup is one call. The registry drives the whole set on character
//! lifecycle events.

pub mod combat_stats;
pub mod dungeon_tracker;
pub mod enhancement_tracker;
pub mod exports;
pub mod listing_age;
pub mod registry;
pub mod resources;
pub mod task_profit;
pub mod timers;
pub mod tooltip_guard;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::application::{DataManager, MarketDataCache, SettingsService};
use crate::infrastructure::observer::UiObserver;
use crate::infrastructure::storage::DocumentStore;
use crate::infrastructure::websocket::Interceptor;
use crate::ports::outbound::{ClipboardPort, Clock, OverlaySink};
use crate::workers::WorkerPool;

pub use registry::FeatureRegistry;
pub use resources::FeatureResources;
pub use timers::TimerRegistry;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("missing data: {0}")]
    MissingData(&'static str),
    #[error("{0}")]
    Failed(String),
}

impl FeatureError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Everything a feature may consume, assembled once by the composition
/// root.
#[derive(Clone)]
pub struct FeatureContext {
    pub interceptor: Arc<Interceptor>,
    pub observer: Arc<UiObserver>,
    pub data: Arc<DataManager>,
    pub settings: Arc<SettingsService>,
    pub market: Arc<MarketDataCache>,
    pub store: Arc<DocumentStore>,
    pub overlay: Arc<dyn OverlaySink>,
    pub clipboard: Arc<dyn ClipboardPort>,
    pub clock: Arc<dyn Clock>,
    pub workers: Arc<WorkerPool>,
}

/// A self-contained consumer of the core subsystems.
///
/// `initialize` must be a no-op when already initialized; `disable` must
/// be idempotent and leave zero overlay nodes and zero live
/// subscriptions behind. Missing data (no character, no market, missing
/// dictionary entries) is a graceful no-op, never an error.
#[async_trait]
pub trait Feature: Send + Sync {
    /// Settings toggle key controlling the feature.
    fn key(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn category(&self) -> &'static str {
        "general"
    }

    async fn initialize(&self, ctx: &FeatureContext) -> Result<(), FeatureError>;
    async fn disable(&self) -> Result<(), FeatureError>;

    /// Post-initialization liveness probe, run by the registry's health
    /// check. Defaults to healthy.
    fn health_check(&self, _ctx: &FeatureContext) -> bool {
        true
    }

    /// Re-render after color token changes.
    async fn refresh(&self, _ctx: &FeatureContext) {}

    /// Called once at script start to wire settings-driven
    /// enable/disable.
    fn setup_setting_listener(self: Arc<Self>, _ctx: &FeatureContext) {}
}
