//! Dungeon run tracker.
//!
//! Maintains at most one in-progress run. A run starts on a wave-0
//! `new_battle` while the current action is a dungeon; its authoritative
//! duration comes from the first and last party key-count chat messages
//! (`validated`), falling back to wall-clock otherwise. Completed runs go
//! to the `unifiedRuns` store behind a duplicate guard; early exits and
//! party failures discard without saving. The in-progress run is
//! persisted after every material change and restored across reloads by
//! `battle_id`.

pub mod backfill;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use toolasha_domain::{render_template, ActionHrid, DungeonRun, RunSource};
use toolasha_protocol::{parse_key_counts, ChatMessage, GameMessage, SystemToken};

use crate::application::events::{EventKind, EventPayload};
use crate::application::settings::setting_keys;
use crate::features::{Feature, FeatureContext, FeatureError, FeatureResources};
use crate::infrastructure::storage::{keys, CollapseStates};
use crate::ports::outbound::VisibilityState;
use crate::util::format_duration_ms;

pub const OVERLAY_CLASS: &str = "toolasha-dungeon-tracker";

/// Duplicate guard windows for the unified store.
pub const DUPLICATE_TIMESTAMP_WINDOW_MS: i64 = 10_000;
pub const DUPLICATE_DURATION_WINDOW_MS: i64 = 2_000;

/// Max-wave fallback for dungeons whose dictionary entry lacks
/// `dungeonInfo.maxWaves`. A dungeon in neither place gets 0 and the
/// tracker cannot complete its runs.
const DUNGEON_MAX_WAVES_FALLBACK: [(&str, u32); 4] = [
    ("/actions/combat/chimerical_den", 50),
    ("/actions/combat/sinister_circus", 50),
    ("/actions/combat/enchanted_fortress", 50),
    ("/actions/combat/pirate_cove", 50),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRun {
    pub battle_id: String,
    pub dungeon_hrid: ActionHrid,
    pub dungeon_name: String,
    pub tier: u8,
    pub max_waves: u32,
    pub start_time: DateTime<Utc>,
    pub last_wave_start: DateTime<Utc>,
    pub wave_times: Vec<u64>,
    pub waves_completed: u32,
    pub team: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_key_count_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub key_counts_map: HashMap<String, u64>,
    #[serde(default)]
    pub hibernation_detected: bool,
}

/// Panel UI state: position, grouping, filters, collapse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonUiState {
    #[serde(default)]
    pub grouping: String,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<(i32, i32)>,
    #[serde(default)]
    pub panel_collapsed: bool,
}

pub struct DungeonTracker {
    weak: Weak<Self>,
    initialized: AtomicBool,
    resources: FeatureResources,
    ctx: RwLock<Option<FeatureContext>>,
    active: Mutex<Option<ActiveRun>>,
    runs: Mutex<Vec<DungeonRun>>,
    ui_state: Mutex<DungeonUiState>,
    collapse: Mutex<Option<Arc<CollapseStates>>>,
    missing_max_waves_warned: AtomicBool,
}

impl DungeonTracker {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            initialized: AtomicBool::new(false),
            resources: FeatureResources::new(),
            ctx: RwLock::new(None),
            active: Mutex::new(None),
            runs: Mutex::new(Vec::new()),
            ui_state: Mutex::new(DungeonUiState::default()),
            collapse: Mutex::new(None),
            missing_max_waves_warned: AtomicBool::new(false),
        })
    }

    fn ctx(&self) -> Option<FeatureContext> {
        self.ctx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Completed runs currently cached (mirrors the `unifiedRuns` store).
    pub fn runs(&self) -> Vec<DungeonRun> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn active_run(&self) -> Option<ActiveRun> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // -------------------------------------------------------------------------
    // Event handling
    // -------------------------------------------------------------------------

    fn on_new_battle(&self, battle_id: &str, wave: u32) {
        let Some(ctx) = self.ctx() else {
            return;
        };
        let now = ctx.clock.now();
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(run) = active.as_mut() {
            if run.battle_id == battle_id || wave > 0 {
                // Next wave of the tracked (or restored) run.
                if wave > run.waves_completed {
                    let wave_time = (now - run.last_wave_start).num_milliseconds().max(0) as u64;
                    if wave > 0 {
                        run.wave_times.push(wave_time);
                    }
                    run.last_wave_start = now;
                    run.waves_completed = wave;
                }
                run.battle_id = battle_id.to_string();
                let snapshot = run.clone();
                drop(active);
                self.persist_in_progress(&ctx, Some(&snapshot));
                return;
            }
            // A different battle at wave 0: the old run never completed.
            tracing::debug!("discarding stale in-progress run for battle {}", run.battle_id);
            *active = None;
        }

        if wave != 0 {
            return;
        }
        // Run start requires the current action to be a dungeon.
        let Some(action) = ctx.data.current_actions().into_iter().next() else {
            return;
        };
        let Some(detail) = ctx.data.action_details(&action.action_hrid) else {
            return;
        };
        if !detail.is_dungeon() {
            return;
        }
        let max_waves = self.resolve_max_waves(&ctx, &action.action_hrid);

        let mut team = ctx
            .data
            .character_data()
            .and_then(|state| state.party_info.map(|p| p.member_names()))
            .filter(|names| !names.is_empty())
            .unwrap_or_else(|| {
                ctx.data
                    .current_character_name()
                    .map(|name| vec![name])
                    .unwrap_or_default()
            });
        team.sort();

        let run = ActiveRun {
            battle_id: battle_id.to_string(),
            dungeon_hrid: action.action_hrid.clone(),
            dungeon_name: detail.name.clone(),
            tier: action.difficulty_tier,
            max_waves,
            start_time: now,
            last_wave_start: now,
            wave_times: Vec::new(),
            waves_completed: 0,
            team,
            first_key_count_at: None,
            key_counts_map: HashMap::new(),
            hibernation_detected: false,
        };
        tracing::info!(dungeon = %run.dungeon_name, battle_id, "dungeon run started");
        *active = Some(run.clone());
        drop(active);
        self.persist_in_progress(&ctx, Some(&run));
    }

    fn resolve_max_waves(&self, ctx: &FeatureContext, hrid: &ActionHrid) -> u32 {
        if let Some(max_waves) = ctx
            .data
            .action_details(hrid)
            .and_then(|d| d.dungeon_max_waves())
            .filter(|max| *max > 0)
        {
            return max_waves;
        }
        if let Some((_, max_waves)) = DUNGEON_MAX_WAVES_FALLBACK
            .iter()
            .find(|(known, _)| *known == hrid.as_str())
        {
            return *max_waves;
        }
        if !self.missing_max_waves_warned.swap(true, Ordering::SeqCst) {
            tracing::warn!(dungeon = %hrid, "no max waves in dictionary or fallback; runs cannot complete");
        }
        0
    }

    fn on_action_completed(&self, action_hrid: &ActionHrid, is_done: bool, wave: Option<u32>) {
        let Some(ctx) = self.ctx() else {
            return;
        };
        let now = ctx.clock.now();
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(run) = active.as_mut() else {
            return;
        };
        if &run.dungeon_hrid != action_hrid {
            return;
        }

        if let Some(wave) = wave {
            run.waves_completed = run.waves_completed.max(wave);
        }

        if !is_done {
            // Wave boundary: close the current wave.
            let wave_time = (now - run.last_wave_start).num_milliseconds().max(0) as u64;
            run.wave_times.push(wave_time);
            run.last_wave_start = now;
            let snapshot = run.clone();
            drop(active);
            self.persist_in_progress(&ctx, Some(&snapshot));
            return;
        }

        let finished = run.max_waves > 0 && run.waves_completed >= run.max_waves;
        let completed = active.take();
        drop(active);
        match (finished, completed) {
            (true, Some(run)) => self.complete_run(&ctx, run, now),
            (false, Some(run)) => {
                tracing::info!(
                    dungeon = %run.dungeon_name,
                    waves = run.waves_completed,
                    "early exit; run discarded"
                );
                self.persist_in_progress(&ctx, None);
            }
            (_, None) => {}
        }
    }

    fn on_chat_message(&self, message: &ChatMessage) {
        if !message.is_party_channel() {
            return;
        }
        let Some(ctx) = self.ctx() else {
            return;
        };
        match message.system_token() {
            SystemToken::PartyKeyCount => {
                let now = ctx.clock.now();
                let counts = parse_key_counts(&message.message);
                let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
                let Some(run) = active.as_mut() else {
                    return;
                };
                run.key_counts_map = counts.iter().cloned().collect();
                let mut team: Vec<String> = counts.into_iter().map(|(name, _)| name).collect();
                team.sort();
                if !team.is_empty() {
                    run.team = team;
                }
                let is_second = run.first_key_count_at.is_some();
                if !is_second {
                    run.first_key_count_at = Some(now);
                    let snapshot = run.clone();
                    drop(active);
                    self.persist_in_progress(&ctx, Some(&snapshot));
                } else {
                    // Second key count: server-validated completion.
                    let Some(completed) = active.take() else {
                        return;
                    };
                    drop(active);
                    self.complete_run(&ctx, completed, now);
                }
            }
            SystemToken::PartyFailed => {
                let discarded = self
                    .active
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if discarded.is_some() {
                    tracing::info!("party failed; run discarded");
                    self.persist_in_progress(&ctx, None);
                }
            }
            _ => {}
        }
    }

    fn on_visibility(&self, state: VisibilityState) {
        if state != VisibilityState::Hidden {
            return;
        }
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = active.as_mut() {
            run.hibernation_detected = true;
        }
    }

    // -------------------------------------------------------------------------
    // Completion & persistence
    // -------------------------------------------------------------------------

    fn complete_run(&self, ctx: &FeatureContext, run: ActiveRun, now: DateTime<Utc>) {
        let wall_clock = (now - run.start_time).num_milliseconds().max(0) as u64;
        let validated_duration = run
            .first_key_count_at
            .map(|first| (now - first).num_milliseconds().max(0) as u64);
        let validated = validated_duration.is_some();
        let duration = validated_duration.unwrap_or(wall_clock);

        let avg_wave_time = (!run.wave_times.is_empty()).then(|| {
            run.wave_times.iter().sum::<u64>() as f64 / run.wave_times.len() as f64
        });

        let record = DungeonRun {
            timestamp: now,
            dungeon_name: run.dungeon_name.clone(),
            dungeon_hrid: Some(run.dungeon_hrid.clone()),
            tier: Some(run.tier),
            team: run.team.clone(),
            duration,
            tracked_duration: (wall_clock != duration).then_some(wall_clock),
            validated,
            wave_times: (!run.wave_times.is_empty()).then(|| run.wave_times.clone()),
            avg_wave_time,
            key_counts_map: run.key_counts_map.clone(),
            source: RunSource::Live,
        };

        {
            let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
            let duplicate = runs.iter().any(|existing| {
                record.is_duplicate_of(
                    existing,
                    DUPLICATE_TIMESTAMP_WINDOW_MS,
                    DUPLICATE_DURATION_WINDOW_MS,
                )
            });
            if duplicate {
                tracing::info!(dungeon = %record.dungeon_name, "duplicate run; not saved");
            } else {
                tracing::info!(
                    dungeon = %record.dungeon_name,
                    duration_ms = record.duration,
                    validated = record.validated,
                    "dungeon run completed"
                );
                runs.push(record.clone());
                ctx.store
                    .set_json_deferred(keys::KEY_ALL_RUNS, &*runs, keys::UNIFIED_RUNS);
            }
        }
        self.persist_in_progress(ctx, None);
        self.render_completion(ctx, &record);
    }

    fn render_completion(&self, ctx: &FeatureContext, record: &DungeonRun) {
        let Some(template) = ctx
            .settings
            .get(setting_keys::DUNGEON_COMPLETE_MESSAGE)
            .and_then(|v| v.as_template().map(|t| t.to_vec()))
        else {
            return;
        };
        let mut vars = HashMap::new();
        vars.insert("dungeon".to_string(), record.dungeon_name.clone());
        vars.insert("time".to_string(), format_duration_ms(record.duration));
        let message = render_template(&template, &vars);
        ctx.overlay.inject(OVERLAY_CLASS, &message);
    }

    fn persist_in_progress(&self, ctx: &FeatureContext, run: Option<&ActiveRun>) {
        ctx.store
            .set_json_deferred(keys::KEY_DUNGEON_IN_PROGRESS, &run, keys::SETTINGS);
    }

    // -------------------------------------------------------------------------
    // Panel UI state
    // -------------------------------------------------------------------------

    pub fn ui_state(&self) -> DungeonUiState {
        self.ui_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_ui_state(&self, state: DungeonUiState) {
        *self
            .ui_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state.clone();
        if let Some(ctx) = self.ctx() {
            ctx.store
                .set_json_deferred(keys::KEY_DUNGEON_UI_STATE, &state, keys::SETTINGS);
        }
    }

    pub fn is_group_collapsed(&self, group: &str) -> bool {
        self.collapse
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.is_collapsed(group))
            .unwrap_or(false)
    }

    pub fn set_group_collapsed(&self, group: &str, collapsed: bool) {
        if let Some(collapse) = self
            .collapse
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            collapse.set_collapsed(group, collapsed);
        }
    }

    // -------------------------------------------------------------------------
    // Backfill
    // -------------------------------------------------------------------------

    /// Scan rendered chat history and persist any reconstructed runs not
    /// already in the store. Returns how many were added.
    pub fn run_backfill(&self) -> usize {
        let Some(ctx) = self.ctx() else {
            return 0;
        };
        if !ctx.settings.is_active(setting_keys::DUNGEON_TRACKER_BACKFILL) {
            return 0;
        }
        let lines: Vec<String> = ctx
            .overlay
            .query_nodes("ChatMessage")
            .into_iter()
            .map(|node| node.text)
            .collect();
        let year = ctx.clock.now().format("%Y").to_string().parse().unwrap_or(2026);
        let reconstructed = backfill::backfill_runs(&lines, year);

        let mut added = 0;
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        for run in reconstructed {
            let duplicate = runs.iter().any(|existing| {
                run.is_duplicate_of(
                    existing,
                    DUPLICATE_TIMESTAMP_WINDOW_MS,
                    DUPLICATE_DURATION_WINDOW_MS,
                )
            });
            if !duplicate {
                runs.push(run);
                added += 1;
            }
        }
        if added > 0 {
            ctx.store
                .set_json_deferred(keys::KEY_ALL_RUNS, &*runs, keys::UNIFIED_RUNS);
        }
        added
    }
}

#[async_trait]
impl Feature for DungeonTracker {
    fn key(&self) -> &'static str {
        setting_keys::DUNGEON_TRACKER
    }

    fn name(&self) -> &'static str {
        "Dungeon Run Tracker"
    }

    fn category(&self) -> &'static str {
        "combat"
    }

    async fn initialize(&self, ctx: &FeatureContext) -> Result<(), FeatureError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx.clone());

        // Warm the caches from storage.
        let stored_runs: Vec<DungeonRun> = ctx
            .store
            .get_json(keys::KEY_ALL_RUNS, keys::UNIFIED_RUNS)
            .await
            .unwrap_or_default();
        *self.runs.lock().unwrap_or_else(PoisonError::into_inner) = stored_runs;
        let in_progress: Option<ActiveRun> = ctx
            .store
            .get_json::<Option<ActiveRun>>(keys::KEY_DUNGEON_IN_PROGRESS, keys::SETTINGS)
            .await
            .flatten();
        if let Some(run) = &in_progress {
            tracing::info!(battle_id = %run.battle_id, "restored in-progress run");
        }
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = in_progress;

        let ui_state: DungeonUiState = ctx
            .store
            .get_json(keys::KEY_DUNGEON_UI_STATE, keys::SETTINGS)
            .await
            .unwrap_or_default();
        *self
            .ui_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = ui_state;
        let collapse = CollapseStates::load(Arc::clone(&ctx.store)).await;
        *self
            .collapse
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(collapse));

        // Root overlay node; its presence is the health probe.
        ctx.overlay.inject(OVERLAY_CLASS, "");

        let bus = ctx.data.bus().clone();

        let weak = self.weak.clone();
        let id = bus.on(
            EventKind::NewBattle,
            Arc::new(move |payload| {
                let Some(tracker) = weak.upgrade() else {
                    return Ok(());
                };
                if let EventPayload::Message(envelope) = payload {
                    if let GameMessage::NewBattle { battle_id, wave, .. } = &envelope.message {
                        tracker.on_new_battle(battle_id, *wave);
                    }
                }
                Ok(())
            }),
        );
        self.resources.track_bus(bus.clone(), EventKind::NewBattle, id);

        let weak = self.weak.clone();
        let id = bus.on(
            EventKind::ActionCompleted,
            Arc::new(move |payload| {
                let Some(tracker) = weak.upgrade() else {
                    return Ok(());
                };
                if let EventPayload::Message(envelope) = payload {
                    if let GameMessage::ActionCompleted { action } = &envelope.message {
                        tracker.on_action_completed(
                            &action.action_hrid,
                            action.is_done,
                            action.wave,
                        );
                    }
                }
                Ok(())
            }),
        );
        self.resources
            .track_bus(bus.clone(), EventKind::ActionCompleted, id);

        let weak = self.weak.clone();
        let id = bus.on(
            EventKind::ActionsUpdated,
            Arc::new(move |payload| {
                let Some(tracker) = weak.upgrade() else {
                    return Ok(());
                };
                if let EventPayload::Message(envelope) = payload {
                    if let GameMessage::ActionsUpdated { actions } = &envelope.message {
                        // A flee shows up as the dungeon action going done
                        // short of max waves.
                        for action in actions {
                            if action.is_done {
                                tracker.on_action_completed(
                                    &action.action_hrid,
                                    true,
                                    action.wave,
                                );
                            }
                        }
                    }
                }
                Ok(())
            }),
        );
        self.resources
            .track_bus(bus.clone(), EventKind::ActionsUpdated, id);

        let weak = self.weak.clone();
        let id = bus.on(
            EventKind::ChatMessageReceived,
            Arc::new(move |payload| {
                let Some(tracker) = weak.upgrade() else {
                    return Ok(());
                };
                if let EventPayload::Message(envelope) = payload {
                    if let GameMessage::ChatMessageReceived { message } = &envelope.message {
                        tracker.on_chat_message(message);
                    }
                }
                Ok(())
            }),
        );
        self.resources
            .track_bus(bus, EventKind::ChatMessageReceived, id);

        let weak = self.weak.clone();
        let handle = ctx.observer.on_visibility(
            "dungeon-tracker",
            Arc::new(move |state| {
                if let Some(tracker) = weak.upgrade() {
                    tracker.on_visibility(state);
                }
                Ok(())
            }),
        );
        self.resources.track_observer(handle);

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
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn health_check(&self, ctx: &FeatureContext) -> bool {
        ctx.overlay.count_by_class(OVERLAY_CLASS) > 0
    }

    async fn refresh(&self, ctx: &FeatureContext) {
        if !self.initialized.load(Ordering::SeqCst) {
            return;
        }
        // Recreate the root so the overlay picks up new color tokens.
        ctx.overlay.remove_by_class(OVERLAY_CLASS);
        ctx.overlay.inject(OVERLAY_CLASS, "");
    }
}
