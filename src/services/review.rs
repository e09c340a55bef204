//! Entry point for recording reviews. Routes each outcome to normal
//! progression, forgetting recovery or the active intensive cycle.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::intensive::{self, CycleError, CycleStatus, RecoveryProgress};
use super::recovery::{self, ForgettingAnalysis, ForgettingEventData, RecoveryPlan};
use super::scheduler::{self, CustomReviewOptions, ReviewScheduleResult, MAX_STAGE};
use crate::store::{DueReviewRow, ReviewHistory, ReviewStore, SubmitReviewRequest};
use crate::types::{
    problem_id_error, time_spent_error, Difficulty, ReviewOutcome, ReviewType, ValidationReport,
};

const NORMAL_BASE_MINUTES: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct ReviewAction {
    pub problem_id: i64,
    pub result: ReviewOutcome,
    pub time_spent: Option<i32>,
    pub confusion_notes: Option<String>,
    pub specific_mistakes: Vec<String>,
    pub custom_next_date: Option<DateTime<Utc>>,
}

impl ReviewAction {
    pub fn new(problem_id: i64, result: ReviewOutcome) -> Self {
        Self {
            problem_id,
            result,
            time_spent: None,
            confusion_notes: None,
            specific_mistakes: Vec::new(),
            custom_next_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub success: bool,
    pub next_review_date: DateTime<Utc>,
    pub message: String,
    pub intensive_recovery: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_plan: Option<RecoveryPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_status: Option<CycleStatus>,
}

impl ReviewResult {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            next_review_date: Utc::now(),
            message,
            intensive_recovery: false,
            recovery_plan: None,
            cycle_status: None,
        }
    }

    fn from_cycle(status: CycleStatus, intensive_recovery: bool) -> Self {
        Self {
            success: true,
            next_review_date: status.next_review_date,
            message: status.status.clone(),
            intensive_recovery,
            recovery_plan: None,
            cycle_status: Some(status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReviewItem {
    pub problem_id: i64,
    pub problem_title: String,
    pub difficulty: Difficulty,
    pub review_type: ReviewType,
    pub priority: u8,
    pub days_overdue: i64,
    pub last_review_date: Option<DateTime<Utc>>,
    pub times_forgotten: u32,
    pub pattern_names: String,
    pub leetcode_link: Option<String>,
}

impl DailyReviewItem {
    /// Rows the store reports as not due carry no recognised review type and
    /// are dropped.
    fn from_row(row: DueReviewRow) -> Option<Self> {
        let review_type = match row.review_type.parse::<ReviewType>() {
            Ok(review_type) => review_type,
            Err(_) => {
                debug!(problem_id = row.problem_id, review_type = %row.review_type, "skipping due row");
                return None;
            }
        };

        Some(Self {
            problem_id: row.problem_id,
            problem_title: row.problem_title,
            difficulty: row.difficulty.parse().unwrap_or(Difficulty::Medium),
            review_type,
            priority: row.priority.clamp(1, 5) as u8,
            days_overdue: row.days_overdue.max(0),
            last_review_date: row.last_review_date,
            times_forgotten: u32::try_from(row.times_forgotten.max(0)).unwrap_or(u32::MAX),
            pattern_names: row.pattern_names.unwrap_or_default(),
            leetcode_link: row.leetcode_link.filter(|link| !link.is_empty()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatistics {
    pub total_problems_in_rotation: usize,
    pub problems_due_today: usize,
    pub overdue_problems: usize,
    pub intensive_recovery_problems: usize,
    pub review_streak: u32,
    pub weekly_completion_rate: f64,
    pub monthly_completion_rate: f64,
    pub forgetting_rate_by_stage: BTreeMap<u8, f64>,
    pub average_recovery_time: f64,
}

pub fn validate_review_action(action: &ReviewAction, now: DateTime<Utc>) -> ValidationReport {
    let mut errors = Vec::new();
    errors.extend(problem_id_error(action.problem_id));
    errors.extend(time_spent_error(action.time_spent));
    if matches!(action.custom_next_date, Some(date) if date <= now) {
        errors.push("Custom next date must be in the future".to_string());
    }
    ValidationReport::from_errors(errors)
}

/// Queue order: priority first, then most overdue, then most often forgotten.
pub fn sort_review_queue(items: &mut [DailyReviewItem]) {
    items.sort_by_key(|item| {
        (
            item.priority,
            Reverse(item.days_overdue),
            Reverse(item.times_forgotten),
        )
    });
}

pub fn get_recommended_study_time(review_type: ReviewType, priority: u8, times_forgotten: u32) -> u32 {
    match review_type {
        ReviewType::IntensiveRecovery => {
            intensive::get_recommended_study_time(times_forgotten, priority)
        }
        ReviewType::NormalReview => {
            let priority_multiplier = (6.0 - f64::from(priority)) * 0.5;
            let forgetting_multiplier = (f64::from(times_forgotten) * 0.3).min(1.5);
            (NORMAL_BASE_MINUTES * (1.0 + priority_multiplier + forgetting_multiplier))
                .round()
                .max(0.0) as u32
        }
    }
}

pub fn get_study_recommendations(
    times_forgotten: u32,
    current_stage: u8,
    specific_mistakes: &[String],
) -> Vec<String> {
    recovery::get_study_recommendations(times_forgotten, current_stage, specific_mistakes)
}

#[derive(Clone)]
pub struct ReviewOrchestrator {
    store: Arc<dyn ReviewStore>,
}

impl ReviewOrchestrator {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn ReviewStore {
        self.store.as_ref()
    }

    /// Records a review outcome. Invalid input yields `success: false`;
    /// store failures degrade to locally computed results.
    pub async fn submit_review(&self, action: &ReviewAction) -> ReviewResult {
        let report = validate_review_action(action, Utc::now());
        if !report.is_valid {
            let message = format!("Invalid review action: {}", report.errors.join(", "));
            warn!(problem_id = action.problem_id, %message, "review rejected");
            return ReviewResult::failed(message);
        }

        let in_recovery = intensive::is_in_intensive_recovery(self.store(), action.problem_id).await;
        debug!(
            problem_id = action.problem_id,
            result = %action.result,
            in_recovery,
            "routing review"
        );

        match (action.result, in_recovery) {
            (_, true) => self.continue_intensive_cycle(action).await,
            (ReviewOutcome::Forgot, false) => self.start_recovery(action).await,
            (ReviewOutcome::Remembered, false) => self.advance_stage(action).await,
        }
    }

    async fn continue_intensive_cycle(&self, action: &ReviewAction) -> ReviewResult {
        let outcome = intensive::process_intensive_review(
            self.store(),
            action.problem_id,
            action.result,
            action.confusion_notes.clone(),
            action.time_spent,
        )
        .await;

        let status = outcome.cycle_status;
        let still_intensive = match action.result {
            ReviewOutcome::Forgot => true,
            ReviewOutcome::Remembered => status.cycles_remaining > 0,
        };
        if !still_intensive {
            info!(problem_id = action.problem_id, "graduated from intensive recovery");
        }
        ReviewResult::from_cycle(status, still_intensive)
    }

    async fn start_recovery(&self, action: &ReviewAction) -> ReviewResult {
        let forgotten_stage = self.current_stage(action.problem_id).await;
        let data = ForgettingEventData {
            problem_id: action.problem_id,
            forgotten_stage,
            time_spent: action.time_spent,
            confusion_notes: action.confusion_notes.clone(),
            specific_mistakes: action.specific_mistakes.clone(),
        };

        let plan = recovery::handle_forgetting_event(self.store(), &data).await;

        // A missing cycle must not block the learner; the plan is still valid.
        if let Err(err) = intensive::create_recovery_cycle(
            self.store(),
            action.problem_id,
            plan.intensive_reviews_needed,
            1,
        )
        .await
        {
            error!(problem_id = action.problem_id, error = %err, "recovery cycle not created");
        }

        ReviewResult {
            success: true,
            next_review_date: plan.next_review_date,
            message: plan.recovery_plan.clone(),
            intensive_recovery: true,
            recovery_plan: Some(plan),
            cycle_status: None,
        }
    }

    async fn advance_stage(&self, action: &ReviewAction) -> ReviewResult {
        let current_stage = self.current_stage(action.problem_id).await;
        let options = action.custom_next_date.map(|date| CustomReviewOptions {
            custom_date: Some(date),
            ..Default::default()
        });

        let schedule = match scheduler::calculate_next_review_date(
            current_stage,
            ReviewOutcome::Remembered,
            options.as_ref(),
        ) {
            Ok(schedule) => schedule,
            Err(err) => return ReviewResult::failed(format!("Failed to submit review: {err}")),
        };

        let request = SubmitReviewRequest {
            problem_id: action.problem_id,
            result: ReviewOutcome::Remembered,
            time_spent: action.time_spent,
            notes: action.confusion_notes.clone(),
            review_stage: Some(schedule.review_stage),
            next_review_date: Some(schedule.next_review_date),
        };

        let message = match self.store.submit_review(&request).await {
            Ok(()) => schedule.message,
            Err(err) => {
                warn!(problem_id = action.problem_id, error = %err, "review not synced");
                format!("{} (not synced)", schedule.message)
            }
        };

        ReviewResult {
            success: true,
            next_review_date: schedule.next_review_date,
            message,
            intensive_recovery: false,
            recovery_plan: None,
            cycle_status: None,
        }
    }

    /// Ladder stage after the latest recorded review; a lapse or missing
    /// history means stage 1.
    async fn current_stage(&self, problem_id: i64) -> u8 {
        match self.store.get_review_history(problem_id).await {
            Ok(history) => history.current_stage().unwrap_or(1).clamp(1, MAX_STAGE),
            Err(err) => {
                warn!(problem_id, error = %err, "history unavailable, assuming stage 1");
                1
            }
        }
    }

    pub async fn get_daily_review_queue(&self, target_date: Option<NaiveDate>) -> Vec<DailyReviewItem> {
        let rows = match self.store.get_due_items(target_date).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "Failed to get daily review queue");
                return Vec::new();
            }
        };

        let mut items: Vec<DailyReviewItem> = rows.into_iter().filter_map(DailyReviewItem::from_row).collect();
        sort_review_queue(&mut items);
        items
    }

    pub async fn get_review_statistics(&self) -> ReviewStatistics {
        let queue = self.get_daily_review_queue(None).await;
        let recovery = intensive::get_recovery_statistics(self.store()).await;

        ReviewStatistics {
            total_problems_in_rotation: queue.len() + recovery.total_active_problems,
            problems_due_today: queue.iter().filter(|item| item.days_overdue >= 0).count(),
            overdue_problems: queue.iter().filter(|item| item.days_overdue > 0).count(),
            intensive_recovery_problems: recovery.total_active_problems,
            average_recovery_time: recovery.total_recovery_days as f64
                / recovery.total_active_problems.max(1) as f64,
            ..Default::default()
        }
    }

    pub async fn schedule_initial_review(&self, problem_id: i64) -> ReviewScheduleResult {
        scheduler::schedule_initial_review(self.store(), problem_id).await
    }

    pub async fn get_review_history(&self, problem_id: i64) -> Option<ReviewHistory> {
        match self.store.get_review_history(problem_id).await {
            Ok(history) => Some(history),
            Err(err) => {
                warn!(problem_id, error = %err, "Failed to get review history");
                None
            }
        }
    }

    pub fn calculate_custom_review_date(
        &self,
        base_date: DateTime<Utc>,
        custom_interval_days: i64,
        stage: Option<u8>,
    ) -> ReviewScheduleResult {
        scheduler::calculate_custom_review_date(base_date, custom_interval_days, stage)
    }

    pub async fn is_in_intensive_recovery(&self, problem_id: i64) -> bool {
        intensive::is_in_intensive_recovery(self.store(), problem_id).await
    }

    /// The intensive schedule wins over the normal ladder.
    pub async fn get_next_review_date(&self, problem_id: i64) -> Option<DateTime<Utc>> {
        if let Some(date) = intensive::get_next_intensive_review_date(self.store(), problem_id).await {
            return Some(date);
        }
        self.get_review_history(problem_id)
            .await
            .and_then(|history| history.next_review_date)
    }

    pub async fn analyze_problem(&self, problem_id: i64) -> Option<ForgettingAnalysis> {
        let history = self.get_review_history(problem_id).await?;
        Some(recovery::analyze_forgetting_patterns(&history.chronological()))
    }

    pub async fn complete_recovery_cycle(&self, problem_id: i64) -> Result<CycleStatus, CycleError> {
        intensive::complete_recovery_cycle(self.store(), problem_id).await
    }

    pub async fn get_recovery_progress(&self, problem_id: i64) -> Option<RecoveryProgress> {
        intensive::get_recovery_progress(self.store(), problem_id).await
    }
}
