//! Scenarios: enhancement session lifecycle, resume, and extension.

use super::*;
use toolasha_domain::SessionState;

fn enhance_frame(observed_level: u8) -> String {
    format!(
        r#"{{"type": "action_completed", "action": {{
            "actionHrid": "/actions/enhancing/enhance",
            "isDone": false,
            "enhancementLevel": {observed_level},
            "primaryItemHrid": "/items/cheese_sword",
            "targetLevel": 5,
            "protectFromLevel": 3
        }}}}"#
    )
}

#[tokio::test]
async fn test_session_created_and_attempts_inferred() {
    let harness = Harness::new().await;
    harness.boot("C1").await;

    harness.feed(&enhance_frame(0)).await; // first observation: session at 0
    harness.feed(&enhance_frame(1)).await; // success at 0
    harness.feed(&enhance_frame(2)).await; // success at 1
    harness.feed(&enhance_frame(0)).await; // failure at 2 (unprotected reset)

    let session = harness
        .enhancement_tracker
        .current_session()
        .expect("session");
    assert_eq!(session.item_hrid.as_str(), "/items/cheese_sword");
    assert_eq!(session.start_level, 0);
    assert_eq!(session.current_level, 0);
    assert_eq!(session.total_successes, 2);
    assert_eq!(session.total_failures, 1);
    assert_eq!(session.current_streak, -1);
    assert_eq!(session.longest_success_streak, 2);
    assert!(session.total_xp > 0.0);

    let at_level_2 = session.attempts_per_level.get(&2).expect("level 2 stats");
    assert_eq!(at_level_2.fail, 1);
    assert_eq!(at_level_2.success_rate, 0.0);
}

#[tokio::test]
async fn test_protected_failure_consumes_protection() {
    let harness = Harness::new().await;
    harness.boot("C1").await;

    for observed in [0, 1, 2, 3] {
        harness.feed(&enhance_frame(observed)).await;
    }
    // Failure at 3 (>= protectFrom 3): drops one level, burns a mirror.
    harness.feed(&enhance_frame(2)).await;

    let session = harness
        .enhancement_tracker
        .current_session()
        .expect("session");
    assert_eq!(session.current_level, 2);
    assert_eq!(session.protection_count, 1);
    // Mirror has no market entry; the vendor price backs the cost.
    assert_eq!(session.protection_cost, 100_000.0);
    assert_eq!(
        session.protection_item_hrid.as_ref().map(|h| h.as_str()),
        Some("/items/mirror_of_protection")
    );
}

#[tokio::test]
async fn test_session_resumes_across_reload() {
    let harness = Harness::new().await;
    harness.boot("C1").await;

    harness.feed(&enhance_frame(0)).await;
    harness.feed(&enhance_frame(1)).await;
    harness.store.flush_all().await;

    // Reload: features torn down and re-initialized from storage.
    harness.registry.disable_all().await;
    harness.registry.initialize_enabled().await;

    // Matching (item, level within one, target, protection) resumes the
    // stored session rather than opening a new one.
    harness.feed(&enhance_frame(2)).await;

    let sessions = harness.enhancement_tracker.sessions();
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    assert_eq!(session.total_successes, 2);
    assert_eq!(session.current_level, 2);
}

#[tokio::test]
async fn test_mismatched_stream_opens_new_session() {
    let harness = Harness::new().await;
    harness.boot("C1").await;

    harness.feed(&enhance_frame(0)).await;
    harness.feed(&enhance_frame(1)).await;

    // An observation far from the session's level cannot resume it.
    harness.feed(&enhance_frame(4)).await;

    assert_eq!(harness.enhancement_tracker.sessions().len(), 2);
    let current = harness
        .enhancement_tracker
        .current_session()
        .expect("session");
    assert_eq!(current.start_level, 4);
    assert_eq!(current.total_successes, 0);
}

#[tokio::test]
async fn test_completion_and_extension_preserve_history() {
    let harness = Harness::new().await;
    harness.boot("C1").await;

    for observed in [0, 1, 2, 3, 4, 5] {
        harness.feed(&enhance_frame(observed)).await;
    }

    let session = harness
        .enhancement_tracker
        .current_session()
        .expect("session");
    assert_eq!(session.state, SessionState::Completed);
    assert!(session.end_time.is_some());
    assert!(session.milestones_reached.contains(&5));
    let successes_at_completion = session.total_successes;

    assert!(harness
        .enhancement_tracker
        .extend_session(&session.id, 8));
    let extended = harness
        .enhancement_tracker
        .current_session()
        .expect("session");
    assert_eq!(extended.state, SessionState::Tracking);
    assert!(extended.end_time.is_none());
    assert_eq!(extended.target_level, 8);
    assert_eq!(extended.total_successes, successes_at_completion);
}

#[tokio::test]
async fn test_predictions_computed_on_worker_pool() {
    let harness = Harness::new().await;
    harness.boot("C1").await;

    harness.feed(&enhance_frame(0)).await;
    let predictions = harness
        .enhancement_tracker
        .compute_predictions()
        .await
        .expect("predictions");
    assert!(predictions.expected_attempts > 0.0);
    assert!(predictions.expected_time.is_finite());

    let session = harness
        .enhancement_tracker
        .current_session()
        .expect("session");
    assert!(session.predictions.is_some());
}
