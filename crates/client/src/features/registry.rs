//! Feature registry and lifecycle.
//!
//! Drives registration, initialization, health checks, one retry, and
//! teardown on character switch. The character-switch path is installed
//! once at setup time and is the single way feature state is torn down
//! between characters.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::application::events::{EventKind, EventPayload};
use crate::application::settings::setting_keys;
use crate::features::{Feature, FeatureContext};

pub const HEALTH_CHECK_DELAY: Duration = Duration::from_millis(500);
pub const RETRY_DELAY: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureState {
    Registered,
    Active,
    Failed,
    Disabled,
}

struct Entry {
    feature: Arc<dyn Feature>,
    state: FeatureState,
}

pub struct FeatureRegistry {
    entries: Mutex<Vec<Entry>>,
    ctx: FeatureContext,
    health_check_delay: Duration,
    retry_delay: Duration,
    /// Serializes init/teardown cycles; a switch arriving mid-init waits.
    lifecycle: Mutex<()>,
}

impl FeatureRegistry {
    pub fn new(ctx: FeatureContext) -> Arc<Self> {
        Self::with_delays(ctx, HEALTH_CHECK_DELAY, RETRY_DELAY)
    }

    pub fn with_delays(
        ctx: FeatureContext,
        health_check_delay: Duration,
        retry_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
            ctx,
            health_check_delay,
            retry_delay,
            lifecycle: Mutex::new(()),
        })
    }

    /// Replace the registry's feature list and wire each feature's
    /// settings listener once.
    pub async fn register_features(&self, features: Vec<Arc<dyn Feature>>) {
        let mut entries = self.entries.lock().await;
        *entries = features
            .into_iter()
            .map(|feature| {
                Arc::clone(&feature).setup_setting_listener(&self.ctx);
                Entry {
                    feature,
                    state: FeatureState::Registered,
                }
            })
            .collect();
    }

    /// Install the lifecycle drivers: initialization on
    /// `character_initialized` (with teardown first on switches) and a
    /// full cycle on `reload_requested`. Installed once.
    pub fn setup(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        self.ctx.data.bus().on(
            EventKind::CharacterInitialized,
            Arc::new(move |payload| {
                let EventPayload::CharacterInitialized {
                    state,
                    is_character_switch,
                } = payload
                else {
                    return Ok(());
                };
                let registry = Arc::clone(&registry);
                let character_id = state.character.id.clone();
                let is_switch = *is_character_switch;
                tokio::spawn(async move {
                    registry
                        .on_character_initialized(&character_id, is_switch)
                        .await;
                });
                Ok(())
            }),
        );

        let registry = Arc::clone(self);
        self.ctx.data.bus().on(
            EventKind::ReloadRequested,
            Arc::new(move |_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry.disable_all().await;
                    registry.initialize_enabled().await;
                });
                Ok(())
            }),
        );

        // Color tokens recompute synchronously in the settings layer;
        // features re-render through refresh afterwards.
        for color_key in [
            setting_keys::COLOR_ACCENT,
            setting_keys::COLOR_TEXT_PRIMARY,
            setting_keys::COLOR_MAIN,
        ] {
            let registry = Arc::clone(self);
            self.ctx.settings.on_setting_change(
                color_key,
                Arc::new(move |_| {
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move {
                        registry.refresh_all().await;
                    });
                    Ok(())
                }),
            );
        }
    }

    /// Re-render every active feature after color-token changes.
    pub async fn refresh_all(&self) {
        let features: Vec<Arc<dyn Feature>> = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .filter(|e| e.state == FeatureState::Active)
                .map(|e| Arc::clone(&e.feature))
                .collect()
        };
        for feature in features {
            feature.refresh(&self.ctx).await;
        }
    }

    async fn on_character_initialized(&self, character_id: &str, is_switch: bool) {
        self.ctx.settings.load_for_character(character_id).await;
        if is_switch {
            tracing::info!(character_id, "character switch: tearing features down");
            self.disable_all().await;
        }
        self.initialize_enabled().await;
    }

    /// Initialize every registered feature whose toggle is active, then
    /// health-check, then retry failures once. Features still failing
    /// after the retry are logged and left disabled for the session.
    pub async fn initialize_enabled(&self) {
        let _cycle = self.lifecycle.lock().await;

        let features: Vec<Arc<dyn Feature>> = {
            let entries = self.entries.lock().await;
            entries.iter().map(|e| Arc::clone(&e.feature)).collect()
        };

        for feature in &features {
            let state = if !self.ctx.settings.is_active(feature.key()) {
                FeatureState::Disabled
            } else {
                match feature.initialize(&self.ctx).await {
                    Ok(()) => FeatureState::Active,
                    Err(e) => {
                        tracing::warn!(feature = feature.name(), "initialize failed: {e}");
                        FeatureState::Failed
                    }
                }
            };
            self.set_state(feature.key(), state).await;
        }

        // Health check: catch features that failed silently.
        tokio::time::sleep(self.health_check_delay).await;
        let mut unhealthy = Vec::new();
        {
            let mut entries = self.entries.lock().await;
            for entry in entries.iter_mut() {
                if entry.state == FeatureState::Active
                    && !entry.feature.health_check(&self.ctx)
                {
                    entry.state = FeatureState::Failed;
                    unhealthy.push(Arc::clone(&entry.feature));
                }
                if entry.state == FeatureState::Failed {
                    unhealthy.push(Arc::clone(&entry.feature));
                }
            }
            unhealthy.dedup_by(|a, b| a.key() == b.key());
        }
        if unhealthy.is_empty() {
            return;
        }

        // One retry round.
        tokio::time::sleep(self.retry_delay).await;
        let mut still_failing = Vec::new();
        for feature in unhealthy {
            if let Err(e) = feature.disable().await {
                tracing::debug!(feature = feature.name(), "pre-retry disable failed: {e}");
            }
            let recovered = match feature.initialize(&self.ctx).await {
                Ok(()) => feature.health_check(&self.ctx),
                Err(e) => {
                    tracing::debug!(feature = feature.name(), "retry failed: {e}");
                    false
                }
            };
            let state = if recovered {
                FeatureState::Active
            } else {
                still_failing.push(feature.name());
                FeatureState::Failed
            };
            self.set_state(feature.key(), state).await;
        }

        if !still_failing.is_empty() {
            tracing::warn!(
                "features failed after retry and stay disabled this session: {}",
                still_failing.join(", ")
            );
        }
    }

    /// Disable every feature, idempotently.
    pub async fn disable_all(&self) {
        let _cycle = self.lifecycle.lock().await;
        let features: Vec<Arc<dyn Feature>> = {
            let entries = self.entries.lock().await;
            entries.iter().map(|e| Arc::clone(&e.feature)).collect()
        };
        for feature in features {
            if let Err(e) = feature.disable().await {
                tracing::warn!(feature = feature.name(), "disable failed: {e}");
            }
            self.set_state(feature.key(), FeatureState::Registered).await;
        }
    }

    async fn set_state(&self, key: &str, state: FeatureState) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.feature.key() == key) {
            entry.state = state;
        }
    }

    pub async fn active_feature_names(&self) -> Vec<&'static str> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter(|e| e.state == FeatureState::Active)
            .map(|e| e.feature.name())
            .collect()
    }

    pub async fn failed_feature_names(&self) -> Vec<&'static str> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter(|e| e.state == FeatureState::Failed)
            .map(|e| e.feature.name())
            .collect()
    }
}
