//! Combat statistics.
//!
//! Accumulates the current combat session from battle messages and keeps
//! the latest snapshot persisted under `latestCombatRun` for the stats
//! popup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use toolasha_protocol::GameMessage;

use crate::application::events::{EventKind, EventPayload};
use crate::application::settings::setting_keys;
use crate::features::{Feature, FeatureContext, FeatureError, FeatureResources};
use crate::infrastructure::storage::keys;

pub const OVERLAY_CLASS: &str = "toolasha-combat-stats";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatRunSnapshot {
    pub battle_id: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub players: Vec<String>,
    pub waves_seen: u32,
}

pub struct CombatStats {
    weak: Weak<Self>,
    initialized: AtomicBool,
    resources: FeatureResources,
    ctx: RwLock<Option<FeatureContext>>,
    snapshot: Mutex<Option<CombatRunSnapshot>>,
}

impl CombatStats {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            initialized: AtomicBool::new(false),
            resources: FeatureResources::new(),
            ctx: RwLock::new(None),
            snapshot: Mutex::new(None),
        })
    }

    fn ctx(&self) -> Option<FeatureContext> {
        self.ctx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn latest(&self) -> Option<CombatRunSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn on_new_battle(&self, battle_id: &str, wave: u32, players: Vec<String>) {
        let Some(ctx) = self.ctx() else {
            return;
        };
        let now = ctx.clock.now();
        let mut snapshot = self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match snapshot.as_mut() {
            Some(current) if current.battle_id == battle_id => {
                current.updated_at = now;
                current.waves_seen = current.waves_seen.max(wave);
                if !players.is_empty() {
                    current.players = players;
                }
            }
            _ => {
                *snapshot = Some(CombatRunSnapshot {
                    battle_id: battle_id.to_string(),
                    started_at: now,
                    updated_at: now,
                    players,
                    waves_seen: wave,
                });
            }
        }
        ctx.store.set_json_deferred(
            keys::KEY_LATEST_COMBAT_RUN,
            &*snapshot,
            keys::COMBAT_STATS,
        );
    }
}

#[async_trait]
impl Feature for CombatStats {
    fn key(&self) -> &'static str {
        setting_keys::COMBAT_STATS
    }

    fn name(&self) -> &'static str {
        "Combat Statistics"
    }

    fn category(&self) -> &'static str {
        "combat"
    }

    async fn initialize(&self, ctx: &FeatureContext) -> Result<(), FeatureError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx.clone());

        let stored: Option<CombatRunSnapshot> = ctx
            .store
            .get_json::<Option<CombatRunSnapshot>>(keys::KEY_LATEST_COMBAT_RUN, keys::COMBAT_STATS)
            .await
            .flatten();
        *self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = stored;

        ctx.overlay.inject(OVERLAY_CLASS, "");

        let bus = ctx.data.bus().clone();
        let weak = self.weak.clone();
        let id = bus.on(
            EventKind::NewBattle,
            Arc::new(move |payload| {
                let Some(stats) = weak.upgrade() else {
                    return Ok(());
                };
                if let EventPayload::Message(envelope) = payload {
                    if let GameMessage::NewBattle {
                        battle_id,
                        wave,
                        players,
                        ..
                    } = &envelope.message
                    {
                        let names = players
                            .iter()
                            .filter(|p| p.is_player)
                            .map(|p| p.name.clone())
                            .collect();
                        stats.on_new_battle(battle_id, *wave, names);
                    }
                }
                Ok(())
            }),
        );
        self.resources.track_bus(bus, EventKind::NewBattle, id);
        Ok(())
    }

    async fn disable(&self) -> Result<(), FeatureError> {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.resources.cleanup_all();
        if let Some(ctx) = self.ctx() {
            ctx.overlay.remove_by_class(OVERLAY_CLASS);
        }
        *self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn health_check(&self, ctx: &FeatureContext) -> bool {
        ctx.overlay.count_by_class(OVERLAY_CLASS) > 0
    }
}
