//! Property-based tests for the interval ladder and the recovery planner.
//!
//! Invariants covered:
//! - Ladder lookups clamp into stages 1..=8
//! - A remembered review advances exactly one stage, capped at 8
//! - A forgotten review is never scheduled by the ladder
//! - Pattern lookup always succeeds and honours the capped lapse count
//! - Recovery estimates never undercut the base review load

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use recall_scheduler::services::recovery::{
    calculate_urgency_level, estimate_recovery_time, find_forgetting_pattern, get_study_recommendations,
};
use recall_scheduler::services::scheduler::{
    calculate_next_review_date_at, estimate_time_to_mastery, get_progression_path, get_standard_interval,
    SchedulerError, STANDARD_INTERVALS,
};
use recall_scheduler::ReviewOutcome;

fn arb_stage() -> impl Strategy<Value = u8> {
    1u8..=8u8
}

fn arb_mistake() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("edge case".to_string()),
        Just("wrong time complexity".to_string()),
        Just("syntax".to_string()),
        "[a-z ]{0,20}",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn standard_interval_always_clamps(stage in any::<i64>()) {
        let interval = get_standard_interval(stage);
        let expected = stage.clamp(1, 8) as u8;
        prop_assert_eq!(interval.stage, expected);
        prop_assert_eq!(interval, STANDARD_INTERVALS[expected as usize - 1]);
    }

    #[test]
    fn remembered_advances_one_stage(stage in arb_stage()) {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let result = calculate_next_review_date_at(stage, ReviewOutcome::Remembered, None, now).unwrap();
        let expected = (stage + 1).min(8);
        prop_assert_eq!(result.review_stage, expected);
        prop_assert_eq!(result.interval_days, STANDARD_INTERVALS[expected as usize - 1].interval_days);
        prop_assert_eq!((result.next_review_date - now).num_days(), result.interval_days);
    }

    #[test]
    fn forgot_is_never_scheduled(stage in any::<u8>()) {
        let now = Utc::now();
        let result = calculate_next_review_date_at(stage, ReviewOutcome::Forgot, None, now);
        prop_assert_eq!(result, Err(SchedulerError::ForgettingNotHandled));
    }

    #[test]
    fn progression_path_stays_on_ladder(stage in arb_stage()) {
        let path = get_progression_path(stage);
        prop_assert_eq!(path.len(), 4.min(9 - stage as usize));
        prop_assert_eq!(path[0].stage, stage);
        prop_assert!(path.iter().all(|s| s.stage <= 8));
        let remaining: i64 = STANDARD_INTERVALS[stage as usize..].iter().map(|s| s.interval_days).sum();
        prop_assert_eq!(estimate_time_to_mastery(stage), remaining);
    }

    #[test]
    fn pattern_lookup_honours_capped_count(stage in 0u8..=10, times in 1u32..=20) {
        let pattern = find_forgetting_pattern(stage, times);
        prop_assert_eq!(pattern.times_forgotten, times.min(3));
        if (1..=4).contains(&stage) {
            prop_assert_eq!(pattern.stage_forgotten, stage);
        }
    }

    #[test]
    fn recovery_time_covers_base_load(count in 0u32..=10, reset in 0i64..=30, times in 0u32..=10) {
        let days = estimate_recovery_time(count, reset, times);
        prop_assert!(i64::from(days) >= i64::from(count) * reset);
        prop_assert!(i64::from(days) <= i64::from(count) * reset * 3);
    }

    #[test]
    fn urgency_stays_in_range(times in 0u32..=10, stage in 0u8..=10) {
        let urgency = calculate_urgency_level(times, stage);
        prop_assert!((2..=5).contains(&urgency));
        if times >= 3 {
            prop_assert_eq!(urgency, 5);
        }
    }

    #[test]
    fn recommendations_keep_base_tiers(
        times in 1u32..=5,
        stage in arb_stage(),
        mistakes in proptest::collection::vec(arb_mistake(), 0..4),
    ) {
        let base_only = get_study_recommendations(times, stage, &[]);
        let with_mistakes = get_study_recommendations(times, stage, &mistakes);
        prop_assert!(base_only.len() >= 7);
        prop_assert!(with_mistakes.starts_with(&base_only));
    }
}
