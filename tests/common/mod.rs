#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use recall_scheduler::store::memory::ProblemRecord;
use recall_scheduler::{Difficulty, MemoryReviewStore, ReviewOrchestrator, ReviewOutcome};

pub fn memory_orchestrator() -> (Arc<MemoryReviewStore>, ReviewOrchestrator) {
    let store = Arc::new(MemoryReviewStore::new());
    let orchestrator = ReviewOrchestrator::new(store.clone());
    (store, orchestrator)
}

pub fn offline_orchestrator() -> (Arc<MemoryReviewStore>, ReviewOrchestrator) {
    let store = Arc::new(MemoryReviewStore::offline());
    let orchestrator = ReviewOrchestrator::new(store.clone());
    (store, orchestrator)
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// Registers a problem whose latest review left it at `stage`.
pub fn seed_problem_at_stage(store: &MemoryReviewStore, problem_id: i64, stage: u8, reviewed_days_ago: i64) {
    store.add_problem(ProblemRecord::new(
        problem_id,
        format!("Problem {problem_id}"),
        Difficulty::Medium,
    ));
    store.record_review(problem_id, stage, ReviewOutcome::Remembered, days_ago(reviewed_days_ago));
}

/// Asserts two instants are within a few seconds of each other.
pub fn assert_close(actual: DateTime<Utc>, expected: DateTime<Utc>) {
    let drift = (actual - expected).num_seconds().abs();
    assert!(drift <= 5, "expected {expected}, got {actual}");
}
