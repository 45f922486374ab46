//! Scenario: boot + feature init.

use std::sync::Arc;

use super::*;
use crate::features::{dungeon_tracker, task_profit};
use crate::ports::outbound::OverlaySink;

#[tokio::test]
async fn test_boot_initializes_all_enabled_features() {
    let harness = Harness::new().await;
    harness.boot("C1").await;

    assert_eq!(harness.data.current_character_id().as_deref(), Some("C1"));
    assert!(harness.data.init_client_data().is_some());

    // Health check found nothing wrong in the happy path.
    assert!(harness.registry.failed_feature_names().await.is_empty());
    let active = harness.registry.active_feature_names().await;
    assert_eq!(active.len(), 9, "all nine features active, got {active:?}");

    // Overlay-rooted features injected their roots.
    assert!(
        harness
            .overlay
            .count_by_class(dungeon_tracker::OVERLAY_CLASS)
            > 0
    );
}

#[tokio::test]
async fn test_disabled_toggle_is_not_initialized() {
    let harness = Harness::new().await;
    harness.feed(&client_data_frame()).await;
    // Toggle off before the character arrives. The write lands in the
    // in-memory layer and persists once the character loads.
    harness.feed(&character_frame("C1")).await;
    harness.settle().await;
    harness.settings.set(
        crate::application::settings::setting_keys::TASK_PROFIT_DISPLAY,
        toolasha_domain::SettingValue::toggle(false),
    );

    // Force a fresh lifecycle cycle.
    harness.registry.disable_all().await;
    harness.registry.initialize_enabled().await;

    let active = harness.registry.active_feature_names().await;
    assert!(!active.contains(&"Task Profit Display"), "got {active:?}");
    assert_eq!(
        harness.overlay.count_by_class(task_profit::OVERLAY_CLASS),
        0
    );
}

#[tokio::test]
async fn test_character_updates_flow_into_projection() {
    let harness = Harness::new().await;
    harness.boot("C1").await;

    harness
        .feed(
            r#"{"type": "skills_updated", "skills": [
                {"skillHrid": "/skills/attack", "level": 71, "experience": 200.0}
            ]}"#,
        )
        .await;

    let state = harness.data.character_data().expect("state");
    assert_eq!(
        state.skill_level(&toolasha_domain::SkillHrid::new("/skills/attack")),
        71
    );
}

#[tokio::test]
async fn test_reroll_spending_accumulates_per_task() {
    let harness = Harness::new().await;
    harness.boot("C1").await;

    assert_eq!(
        harness.task_profit.record_reroll_spend("task-7", 10_000).await,
        10_000
    );
    assert_eq!(
        harness.task_profit.record_reroll_spend("task-7", 5_000).await,
        15_000
    );
    assert_eq!(harness.task_profit.reroll_spend("task-7").await, 15_000);
    assert_eq!(harness.task_profit.reroll_spend("task-8").await, 0);
}

#[tokio::test]
async fn test_dungeon_panel_ui_state_round_trip() {
    use crate::features::dungeon_tracker::DungeonUiState;

    let harness = Harness::new().await;
    harness.boot("C1").await;

    harness.dungeon_tracker.set_ui_state(DungeonUiState {
        grouping: "by-team".to_string(),
        filters: vec!["validated".to_string()],
        position: Some((120, 40)),
        panel_collapsed: true,
    });
    harness.dungeon_tracker.set_group_collapsed("wave-times", true);
    harness.store.flush_all().await;

    // Reload the feature; persisted panel state comes back.
    harness.registry.disable_all().await;
    harness.registry.initialize_enabled().await;

    let state = harness.dungeon_tracker.ui_state();
    assert_eq!(state.grouping, "by-team");
    assert_eq!(state.position, Some((120, 40)));
    assert!(state.panel_collapsed);
    assert!(harness.dungeon_tracker.is_group_collapsed("wave-times"));
    assert!(!harness.dungeon_tracker.is_group_collapsed("run-history"));
}

#[tokio::test]
async fn test_cached_client_data_scan_on_reload() {
    let harness = Harness::new().await;
    harness.feed(&client_data_frame()).await;
    harness.store.flush_all().await;

    // A second session over the same store: the dictionary never comes
    // over the wire, only from the scan.
    let interceptor2 =
        crate::infrastructure::websocket::Interceptor::new(Arc::clone(&harness.store));
    let bus2 = crate::application::EventBus::new();
    let data2 = crate::application::DataManager::new(bus2);
    data2.attach(&interceptor2);

    assert!(data2.init_client_data().is_none());
    assert!(interceptor2.scan_cached_client_data().await);
    assert!(data2.init_client_data().is_some());
}
