//! Enhancement tracker.
//!
//! Watches enhancing actions complete and infers attempt outcomes from
//! level observations: a level one above the session's current level is
//! a success, anything at or below it is a failure (protected failures
//! drop one level, unprotected ones reset). Sessions persist across
//! reloads; a fresh attempt stream resumes the existing session when
//! item, level (±1), target, and protection all match.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use uuid::Uuid;

use toolasha_domain::{
    EnhancementSession, ItemHrid, PriceContext, SessionPredictions,
};
use toolasha_protocol::GameMessage;

use crate::application::events::{EventKind, EventPayload};
use crate::application::market::ItemPriceOptions;
use crate::application::settings::setting_keys;
use crate::features::{Feature, FeatureContext, FeatureError, FeatureResources};
use crate::infrastructure::storage::keys;
use crate::workers::enhance_cost::BASE_SUCCESS_RATES;
use crate::workers::{TaskData, TaskOutput};

pub const OVERLAY_CLASS: &str = "toolasha-enhancement-tracker";

const DEFAULT_PROTECTION_ITEM: &str = "/items/mirror_of_protection";
const ENHANCE_ATTEMPT_SECONDS: f64 = 2.0;

pub struct EnhancementTracker {
    weak: Weak<Self>,
    initialized: AtomicBool,
    resources: FeatureResources,
    ctx: RwLock<Option<FeatureContext>>,
    sessions: Mutex<HashMap<String, EnhancementSession>>,
    current_session_id: Mutex<Option<String>>,
}

impl EnhancementTracker {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            initialized: AtomicBool::new(false),
            resources: FeatureResources::new(),
            ctx: RwLock::new(None),
            sessions: Mutex::new(HashMap::new()),
            current_session_id: Mutex::new(None),
        })
    }

    fn ctx(&self) -> Option<FeatureContext> {
        self.ctx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn current_session(&self) -> Option<EnhancementSession> {
        // Lock order everywhere: sessions, then current id.
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let id = self
            .current_session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        sessions.get(&id).cloned()
    }

    pub fn sessions(&self) -> Vec<EnhancementSession> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// One observed level for the item under enhancement. Creates,
    /// resumes, or advances a session as appropriate.
    pub fn handle_observation(
        &self,
        item_hrid: &ItemHrid,
        observed_level: u8,
        target_level: u8,
        protect_from: u8,
    ) {
        let Some(ctx) = self.ctx() else {
            return;
        };
        let now = ctx.clock.now();
        let item_name = ctx
            .data
            .item_details(item_hrid)
            .map(|d| d.name)
            .unwrap_or_else(|| item_hrid.leaf().to_string());
        let item_level = ctx
            .data
            .item_details(item_hrid)
            .map(|d| d.item_level)
            .unwrap_or(0);

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let mut current_id = self
            .current_session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Resume: the current session if it still matches, else any
        // tracking session that does.
        let resumed_id = current_id
            .as_ref()
            .filter(|id| {
                sessions
                    .get(*id)
                    .map(|s| s.matches_resume(item_hrid, observed_level, target_level, protect_from))
                    .unwrap_or(false)
            })
            .cloned()
            .or_else(|| {
                sessions
                    .values()
                    .find(|s| {
                        s.matches_resume(item_hrid, observed_level, target_level, protect_from)
                    })
                    .map(|s| s.id.clone())
            });

        let session_id = match resumed_id {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                tracing::info!(item = %item_hrid, observed_level, target_level, "new enhancement session");
                sessions.insert(
                    id.clone(),
                    EnhancementSession::new(
                        id.clone(),
                        item_hrid.clone(),
                        item_name,
                        observed_level,
                        target_level,
                        protect_from,
                        now,
                    ),
                );
                id
            }
        };
        *current_id = Some(session_id.clone());

        let Some(session) = sessions.get_mut(&session_id) else {
            return;
        };

        if observed_level != session.current_level {
            let attempted_at = session.current_level;
            let success = observed_level == session.current_level + 1;

            // Price the attempt inputs off the enhancing action.
            let material_cost = self.attempt_material_cost(&ctx);
            session.add_attempt_costs(material_cost, 0.0, 0);

            if !success && attempted_at >= protect_from {
                let protection_hrid = ItemHrid::new(DEFAULT_PROTECTION_ITEM);
                let protection_cost = ctx
                    .market
                    .get_item_price(
                        &protection_hrid,
                        &ItemPriceOptions {
                            context: PriceContext::Default,
                            ..Default::default()
                        },
                        ctx.data.init_client_data().as_deref(),
                    )
                    .unwrap_or(0.0);
                session.add_protection_use(protection_cost, protection_hrid);
            }

            session.total_xp += EnhancementSession::attempt_xp(
                attempted_at,
                item_level,
                0.0,
                success,
            );
            if let Err(e) = session.record_attempt(attempted_at, success, observed_level, now) {
                tracing::warn!("enhancement attempt not recorded: {e}");
            }
        }

        ctx.store
            .set_json_deferred(keys::KEY_ENHANCEMENT_SESSIONS, &*sessions, keys::SETTINGS);
        ctx.store.set_json_deferred(
            keys::KEY_ENHANCEMENT_CURRENT,
            &*current_id,
            keys::SETTINGS,
        );
    }

    fn attempt_material_cost(&self, ctx: &FeatureContext) -> f64 {
        let Some(data) = ctx.data.init_client_data() else {
            return 0.0;
        };
        let Some(action) = ctx
            .data
            .current_actions()
            .into_iter()
            .find(|a| a.action_hrid.as_str().starts_with("/actions/enhancing/"))
        else {
            return 0.0;
        };
        let Some(detail) = data.action(&action.action_hrid) else {
            return 0.0;
        };
        detail
            .input_items
            .iter()
            .filter_map(|input| {
                ctx.market
                    .get_item_price(
                        &input.item_hrid,
                        &ItemPriceOptions::default(),
                        Some(data.as_ref()),
                    )
                    .map(|price| price * input.count)
            })
            .sum()
    }

    /// Finalize the current session without reaching the target.
    pub fn finalize_current(&self) {
        let Some(ctx) = self.ctx() else {
            return;
        };
        let now = ctx.clock.now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let current_id = self
            .current_session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(session) = current_id.and_then(|id| sessions.get_mut(&id)) {
            session.finalize(now);
        }
        ctx.store
            .set_json_deferred(keys::KEY_ENHANCEMENT_SESSIONS, &*sessions, keys::SETTINGS);
    }

    /// Extend a completed session to a new target level.
    pub fn extend_session(&self, session_id: &str, new_target: u8) -> bool {
        let Some(ctx) = self.ctx() else {
            return false;
        };
        let now = ctx.clock.now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        if let Err(e) = session.extend_to(new_target, now) {
            tracing::warn!("session extension rejected: {e}");
            return false;
        }
        *self
            .current_session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(session_id.to_string());
        ctx.store
            .set_json_deferred(keys::KEY_ENHANCEMENT_SESSIONS, &*sessions, keys::SETTINGS);
        true
    }

    /// Compute predictions for the current session on the worker pool and
    /// store them on the session.
    pub async fn compute_predictions(&self) -> Option<SessionPredictions> {
        let ctx = self.ctx()?;
        let session = self.current_session()?;
        if !session.is_tracking() {
            return None;
        }

        let input = crate::workers::EnhanceCostInput {
            success_rates: BASE_SUCCESS_RATES.to_vec(),
            start_level: session.current_level,
            target_level: session.target_level,
            protect_from: session.protect_from,
            attempt_seconds: ENHANCE_ATTEMPT_SECONDS,
            success_multiplier: 1.0,
        };
        let output = ctx
            .workers
            .execute(TaskData::EnhanceCost(input))
            .await
            .ok()?;
        let TaskOutput::EnhanceCost(estimate) = output else {
            return None;
        };
        let predictions = SessionPredictions {
            expected_attempts: estimate.expected_attempts,
            expected_protections: estimate.expected_protections,
            expected_time: estimate.expected_time_ms,
            success_multiplier: 1.0,
        };

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(stored) = sessions.get_mut(&session.id) {
            stored.predictions = Some(predictions.clone());
            ctx.store
                .set_json_deferred(keys::KEY_ENHANCEMENT_SESSIONS, &*sessions, keys::SETTINGS);
        }
        Some(predictions)
    }
}

#[async_trait]
impl Feature for EnhancementTracker {
    fn key(&self) -> &'static str {
        setting_keys::ENHANCEMENT_TRACKER
    }

    fn name(&self) -> &'static str {
        "Enhancement Tracker"
    }

    fn category(&self) -> &'static str {
        "production"
    }

    async fn initialize(&self, ctx: &FeatureContext) -> Result<(), FeatureError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx.clone());

        let stored: HashMap<String, EnhancementSession> = ctx
            .store
            .get_json(keys::KEY_ENHANCEMENT_SESSIONS, keys::SETTINGS)
            .await
            .unwrap_or_default();
        *self.sessions.lock().unwrap_or_else(PoisonError::into_inner) = stored;
        let current: Option<String> = ctx
            .store
            .get_json::<Option<String>>(keys::KEY_ENHANCEMENT_CURRENT, keys::SETTINGS)
            .await
            .flatten();
        *self
            .current_session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = current;

        ctx.overlay.inject(OVERLAY_CLASS, "");

        let bus = ctx.data.bus().clone();
        let weak = self.weak.clone();
        let id = bus.on(
            EventKind::ActionCompleted,
            Arc::new(move |payload| {
                let Some(tracker) = weak.upgrade() else {
                    return Ok(());
                };
                if let EventPayload::Message(envelope) = payload {
                    if let GameMessage::ActionCompleted { action } = &envelope.message {
                        if action.action_hrid.as_str().starts_with("/actions/enhancing/") {
                            if let (Some(item), Some(level), Some(target)) = (
                                action.primary_item_hrid.as_ref(),
                                action.enhancement_level,
                                action.target_level,
                            ) {
                                tracker.handle_observation(
                                    item,
                                    level,
                                    target,
                                    action.protect_from_level.unwrap_or(u8::MAX),
                                );
                            }
                        }
                    }
                }
                Ok(())
            }),
        );
        self.resources
            .track_bus(bus, EventKind::ActionCompleted, id);

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
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self
            .current_session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn health_check(&self, ctx: &FeatureContext) -> bool {
        ctx.overlay.count_by_class(OVERLAY_CLASS) > 0
    }
}
