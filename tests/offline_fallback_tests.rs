use chrono::{Duration, Utc};
use recall_scheduler::services::intensive::{self, CycleError};
use recall_scheduler::services::recovery::{self, ForgettingEventData};
use recall_scheduler::services::review::ReviewAction;
use recall_scheduler::services::scheduler;
use recall_scheduler::{MemoryReviewStore, ReviewOutcome};

mod common;

use common::{assert_close, offline_orchestrator};

#[tokio::test]
async fn test_forgetting_offline_uses_local_plan() {
    let (store, orchestrator) = offline_orchestrator();

    let action = ReviewAction {
        specific_mistakes: vec!["missed the boundary".to_string()],
        ..ReviewAction::new(1, ReviewOutcome::Forgot)
    };
    let result = orchestrator.submit_review(&action).await;

    assert!(result.success);
    assert!(result.intensive_recovery);
    let plan = result.recovery_plan.expect("recovery plan");
    assert!(plan.offline);
    // History is unreachable, so the lapse is treated as a first one at stage 1.
    assert_eq!(
        plan.recovery_plan,
        "Forgot at 1-day mark: Pattern not consolidated - restart with 2 daily intensive reviews (Offline mode - limited analysis)"
    );
    assert_eq!(plan.intensive_reviews_needed, 2);
    assert_eq!(plan.urgency_level, 4);
    assert_eq!(plan.estimated_recovery_days, 3);
    assert!(plan
        .study_recommendations
        .contains(&"Practice edge cases: empty arrays, single elements, duplicates".to_string()));
    assert_close(result.next_review_date, Utc::now() + Duration::days(1));

    // The cycle could not be stored, but the learner still got a plan.
    store.set_online(true);
    assert!(store.cycles().is_empty());
}

#[tokio::test]
async fn test_remembered_offline_still_schedules() {
    let (_store, orchestrator) = offline_orchestrator();

    let result = orchestrator
        .submit_review(&ReviewAction::new(4, ReviewOutcome::Remembered))
        .await;

    assert!(result.success);
    assert!(!result.intensive_recovery);
    assert_eq!(
        result.message,
        "Advanced to stage 2 - next review in 3 days (not synced)"
    );
    assert_close(result.next_review_date, Utc::now() + Duration::days(3));
}

#[tokio::test]
async fn test_read_paths_degrade_to_empty() {
    let (_store, orchestrator) = offline_orchestrator();

    assert!(orchestrator.get_daily_review_queue(None).await.is_empty());
    assert!(!orchestrator.is_in_intensive_recovery(1).await);
    assert!(orchestrator.get_recovery_progress(1).await.is_none());
    assert!(orchestrator.get_review_history(1).await.is_none());
    assert!(orchestrator.get_next_review_date(1).await.is_none());
    assert!(orchestrator.analyze_problem(1).await.is_none());

    let stats = orchestrator.get_review_statistics().await;
    assert_eq!(stats.total_problems_in_rotation, 0);
    assert_eq!(stats.intensive_recovery_problems, 0);
    assert_eq!(stats.average_recovery_time, 0.0);
}

#[tokio::test]
async fn test_cycle_writes_fail_outward() {
    let store = MemoryReviewStore::offline();

    let created = intensive::create_recovery_cycle(&store, 1, 3, 1).await;
    assert!(matches!(created, Err(CycleError::Create(_))));

    let completed = intensive::complete_recovery_cycle(&store, 1).await;
    assert!(matches!(completed, Err(CycleError::Complete(_))));
}

#[tokio::test]
async fn test_intensive_review_offline_guesses_conservatively() {
    let store = MemoryReviewStore::offline();

    let remembered =
        intensive::process_intensive_review(&store, 2, ReviewOutcome::Remembered, None, Some(15)).await;
    assert_eq!(remembered.time_spent, Some(15));
    assert_eq!(remembered.cycle_status.cycles_remaining, 2);
    assert_eq!(
        remembered.cycle_status.status,
        "Intensive cycle continues - estimated cycles remaining"
    );

    let forgot = intensive::process_intensive_review(
        &store,
        2,
        ReviewOutcome::Forgot,
        Some("mixed up the window".to_string()),
        None,
    )
    .await;
    assert_eq!(forgot.cycle_status.cycles_remaining, 3);
    assert_eq!(
        forgot.cycle_status.status,
        "FAILED intensive review - cycle restarted (offline mode)"
    );
    assert!(forgot.cycle_status.offline);

    let stats = intensive::get_recovery_statistics(&store).await;
    assert_eq!(stats.total_active_problems, 0);
    assert!(intensive::get_active_recovery_cycles(&store).await.is_empty());
    assert!(intensive::get_next_intensive_review_date(&store, 2).await.is_none());
}

#[tokio::test]
async fn test_initial_schedule_offline() {
    let store = MemoryReviewStore::offline();

    let result = scheduler::schedule_initial_review(&store, 9).await;
    assert_eq!(result.review_stage, 1);
    assert_eq!(result.interval_days, 1);
    assert_eq!(result.message, "Initial review scheduled for tomorrow (offline mode)");
    assert_close(result.next_review_date, Utc::now() + Duration::days(1));
}

#[tokio::test]
async fn test_planner_offline_at_late_stage() {
    let store = MemoryReviewStore::offline();
    let data = ForgettingEventData {
        problem_id: 3,
        forgotten_stage: 6,
        ..Default::default()
    };

    let plan = recovery::handle_forgetting_event(&store, &data).await;
    assert!(plan.offline);
    assert!(plan.recovery_plan.starts_with("Forgot at 60+ day mark"));
    assert_eq!(plan.intensive_reviews_needed, 1);
    assert_eq!(plan.urgency_level, 2);
    assert_close(plan.next_review_date, Utc::now() + Duration::days(14));
}
