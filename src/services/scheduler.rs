use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::store::ReviewStore;
use crate::types::{add_days, days_until, ReviewOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalStage {
    pub stage: u8,
    pub interval_days: i64,
    pub description: &'static str,
}

/// 1 → 3 → 7 → 14 → 30 → 60 → 120 → 240 days.
pub const STANDARD_INTERVALS: [IntervalStage; 8] = [
    IntervalStage { stage: 1, interval_days: 1, description: "Next day - Initial consolidation" },
    IntervalStage { stage: 2, interval_days: 3, description: "Day 3 - Critical memory cliff" },
    IntervalStage { stage: 3, interval_days: 7, description: "Week 1 - Short-term retention test" },
    IntervalStage { stage: 4, interval_days: 14, description: "Week 2 - Medium-term retention" },
    IntervalStage { stage: 5, interval_days: 30, description: "Month 1 - Long-term memory formation" },
    IntervalStage { stage: 6, interval_days: 60, description: "Month 2 - Deep long-term retention" },
    IntervalStage { stage: 7, interval_days: 120, description: "Month 4 - Permanent memory test" },
    IntervalStage { stage: 8, interval_days: 240, description: "Month 8 - Master level retention" },
];

pub const MAX_STAGE: u8 = STANDARD_INTERVALS.len() as u8;

const PROGRESSION_PREVIEW: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewScheduleResult {
    pub next_review_date: DateTime<Utc>,
    pub review_stage: u8,
    pub interval_days: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct CustomReviewOptions {
    pub custom_date: Option<DateTime<Utc>>,
    pub skip_stage_progression: bool,
    pub reset_to_stage: Option<i64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// Forgetting is a different policy; it must go through the recovery
    /// planner.
    #[error("forgetting events should be handled by the recovery planner, not the interval scheduler")]
    ForgettingNotHandled,
}

fn clamp_stage(stage: i64) -> u8 {
    stage.clamp(1, MAX_STAGE as i64) as u8
}

pub fn get_standard_interval(stage: i64) -> IntervalStage {
    STANDARD_INTERVALS[clamp_stage(stage) as usize - 1]
}

pub fn get_standard_intervals() -> Vec<IntervalStage> {
    STANDARD_INTERVALS.to_vec()
}

pub fn is_valid_stage(stage: i64) -> bool {
    (1..=MAX_STAGE as i64).contains(&stage)
}

pub fn max_stage() -> u8 {
    MAX_STAGE
}

pub fn calculate_next_review_date(
    current_stage: u8,
    result: ReviewOutcome,
    options: Option<&CustomReviewOptions>,
) -> Result<ReviewScheduleResult, SchedulerError> {
    calculate_next_review_date_at(current_stage, result, options, Utc::now())
}

pub fn calculate_next_review_date_at(
    current_stage: u8,
    result: ReviewOutcome,
    options: Option<&CustomReviewOptions>,
    now: DateTime<Utc>,
) -> Result<ReviewScheduleResult, SchedulerError> {
    let default_options = CustomReviewOptions::default();
    let options = options.unwrap_or(&default_options);

    if let Some(custom_date) = options.custom_date {
        let stage = options
            .reset_to_stage
            .map(clamp_stage)
            .unwrap_or(current_stage);
        return Ok(ReviewScheduleResult {
            next_review_date: custom_date,
            review_stage: stage,
            interval_days: days_until(now, custom_date),
            message: format!("Custom review date set for {}", custom_date.format("%a %b %d %Y")),
        });
    }

    if let Some(reset_to) = options.reset_to_stage {
        let interval = get_standard_interval(reset_to);
        return Ok(ReviewScheduleResult {
            next_review_date: add_days(now, interval.interval_days),
            review_stage: interval.stage,
            interval_days: interval.interval_days,
            message: format!("Reset to stage {} ({})", interval.stage, interval.description),
        });
    }

    if result == ReviewOutcome::Forgot {
        return Err(SchedulerError::ForgettingNotHandled);
    }

    let next_stage = if options.skip_stage_progression {
        clamp_stage(current_stage as i64)
    } else {
        clamp_stage(current_stage as i64 + 1)
    };
    let interval = get_standard_interval(next_stage as i64);

    Ok(ReviewScheduleResult {
        next_review_date: add_days(now, interval.interval_days),
        review_stage: next_stage,
        interval_days: interval.interval_days,
        message: format!(
            "Advanced to stage {} - next review in {} days",
            next_stage, interval.interval_days
        ),
    })
}

/// Records the first review for a newly solved problem. Falls back to a
/// local stage-1 schedule when the store is unreachable.
pub async fn schedule_initial_review(store: &dyn ReviewStore, problem_id: i64) -> ReviewScheduleResult {
    match store.schedule_initial(problem_id).await {
        Ok(row) => ReviewScheduleResult {
            next_review_date: row.scheduled_date,
            review_stage: row.review_stage,
            interval_days: 1,
            message: row.message,
        },
        Err(err) => {
            warn!(problem_id, error = %err, "schedule_initial failed, using local calculation");
            local_initial_schedule(Utc::now())
        }
    }
}

fn local_initial_schedule(now: DateTime<Utc>) -> ReviewScheduleResult {
    let first = get_standard_interval(1);
    ReviewScheduleResult {
        next_review_date: add_days(now, first.interval_days),
        review_stage: first.stage,
        interval_days: first.interval_days,
        message: "Initial review scheduled for tomorrow (offline mode)".to_string(),
    }
}

pub fn calculate_custom_review_date(
    base_date: DateTime<Utc>,
    custom_interval_days: i64,
    stage: Option<u8>,
) -> ReviewScheduleResult {
    ReviewScheduleResult {
        next_review_date: add_days(base_date, custom_interval_days),
        review_stage: stage.unwrap_or(1),
        interval_days: custom_interval_days,
        message: format!(
            "Custom interval: {} days from {}",
            custom_interval_days,
            base_date.format("%a %b %d %Y")
        ),
    }
}

/// Up to the next three stages, starting with the current one.
pub fn get_progression_path(current_stage: u8) -> Vec<IntervalStage> {
    let stage = clamp_stage(i64::from(current_stage)) as usize;
    let end = (stage + PROGRESSION_PREVIEW).min(STANDARD_INTERVALS.len());
    STANDARD_INTERVALS[stage - 1..end].to_vec()
}

/// Days left until the final stage is reached.
pub fn estimate_time_to_mastery(current_stage: u8) -> i64 {
    if current_stage >= MAX_STAGE {
        return 0;
    }
    STANDARD_INTERVALS
        .iter()
        .skip(current_stage as usize)
        .map(|s| s.interval_days)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_ladder_shape() {
        let days: Vec<i64> = STANDARD_INTERVALS.iter().map(|s| s.interval_days).collect();
        assert_eq!(days, vec![1, 3, 7, 14, 30, 60, 120, 240]);
        for (idx, stage) in STANDARD_INTERVALS.iter().enumerate() {
            assert_eq!(stage.stage as usize, idx + 1);
        }
        assert!(days.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_interval_clamping() {
        assert_eq!(get_standard_interval(0).stage, 1);
        assert_eq!(get_standard_interval(-4).stage, 1);
        assert_eq!(get_standard_interval(10).stage, 8);
        assert_eq!(get_standard_interval(2).description, "Day 3 - Critical memory cliff");
    }

    #[test]
    fn test_remembered_advances_one_stage() {
        let result = calculate_next_review_date_at(1, ReviewOutcome::Remembered, None, fixed_now()).unwrap();
        assert_eq!(result.review_stage, 2);
        assert_eq!(result.interval_days, 3);
        assert_eq!(result.next_review_date, add_days(fixed_now(), 3));
        assert!(result.message.contains("Advanced to stage 2"));
    }

    #[test]
    fn test_remembered_stays_at_max_stage() {
        let result = calculate_next_review_date_at(8, ReviewOutcome::Remembered, None, fixed_now()).unwrap();
        assert_eq!(result.review_stage, 8);
        assert_eq!(result.interval_days, 240);
    }

    #[test]
    fn test_forgot_is_rejected() {
        for stage in 1..=8 {
            let err = calculate_next_review_date(stage, ReviewOutcome::Forgot, None).unwrap_err();
            assert_eq!(err, SchedulerError::ForgettingNotHandled);
        }
    }

    #[test]
    fn test_skip_progression_holds_stage() {
        let options = CustomReviewOptions {
            skip_stage_progression: true,
            ..Default::default()
        };
        let result =
            calculate_next_review_date_at(4, ReviewOutcome::Remembered, Some(&options), fixed_now()).unwrap();
        assert_eq!(result.review_stage, 4);
        assert_eq!(result.interval_days, 14);
    }

    #[test]
    fn test_reset_applies_even_for_forgot() {
        let options = CustomReviewOptions {
            reset_to_stage: Some(2),
            ..Default::default()
        };
        let result =
            calculate_next_review_date_at(5, ReviewOutcome::Forgot, Some(&options), fixed_now()).unwrap();
        assert_eq!(result.review_stage, 2);
        assert_eq!(result.interval_days, 3);
        assert!(result.message.contains("Reset to stage 2"));

        let clamped = CustomReviewOptions {
            reset_to_stage: Some(42),
            ..Default::default()
        };
        let result =
            calculate_next_review_date_at(5, ReviewOutcome::Remembered, Some(&clamped), fixed_now()).unwrap();
        assert_eq!(result.review_stage, 8);
    }

    #[test]
    fn test_custom_date_is_returned_verbatim() {
        let target = Utc.with_ymd_and_hms(2024, 6, 11, 9, 0, 0).unwrap();
        let options = CustomReviewOptions {
            custom_date: Some(target),
            ..Default::default()
        };
        let result =
            calculate_next_review_date_at(3, ReviewOutcome::Remembered, Some(&options), fixed_now()).unwrap();
        assert_eq!(result.next_review_date, target);
        assert_eq!(result.review_stage, 3);
        assert_eq!(result.interval_days, 10);
        assert!(result.message.starts_with("Custom review date set"));
    }

    #[test]
    fn test_custom_review_date() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let result = calculate_custom_review_date(base, 5, Some(3));
        assert_eq!(result.next_review_date, Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap());
        assert_eq!(result.review_stage, 3);
        assert_eq!(result.interval_days, 5);

        assert_eq!(calculate_custom_review_date(base, 2, None).review_stage, 1);
    }

    #[test]
    fn test_custom_review_date_out_of_range() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let far = calculate_custom_review_date(base, i64::MAX / 2, Some(3));
        assert_eq!(far.next_review_date, DateTime::<Utc>::MAX_UTC);
        assert_eq!(far.review_stage, 3);
        assert_eq!(far.interval_days, i64::MAX / 2);

        let past = calculate_custom_review_date(base, i64::MIN, None);
        assert_eq!(past.next_review_date, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_time_to_mastery() {
        assert_eq!(estimate_time_to_mastery(1), 474);
        assert_eq!(estimate_time_to_mastery(7), 240);
        assert_eq!(estimate_time_to_mastery(8), 0);
    }

    #[test]
    fn test_progression_path() {
        let stages = |s: u8| get_progression_path(s).iter().map(|i| i.stage).collect::<Vec<_>>();
        assert_eq!(stages(3), vec![3, 4, 5, 6]);
        assert_eq!(stages(7), vec![7, 8]);
        assert_eq!(stages(8), vec![8]);
        assert_eq!(stages(1), vec![1, 2, 3, 4]);
        assert_eq!(stages(0), stages(1));
        assert_eq!(stages(200), vec![8]);
    }

    #[test]
    fn test_stage_validity() {
        assert!(is_valid_stage(1));
        assert!(is_valid_stage(8));
        assert!(!is_valid_stage(0));
        assert!(!is_valid_stage(9));
        assert_eq!(max_stage(), 8);
    }
}
