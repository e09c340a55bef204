//! In-process `ReviewStore` that mirrors the review server's behaviour.
//! Used by tests and by embedders without a backend. It can be switched
//! offline to make every call fail.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::{
    CreateCycleRequest, CycleStatusRow, DueReviewRow, HandleForgettingRequest, InitialScheduleRow,
    IntensiveCycleRequest, IntensiveRecoveryCycle, RecoveryPlanRow, ReviewHistory,
    ReviewHistoryEntry, ReviewStore, StoreError, SubmitReviewRequest,
};
use crate::services::recovery::{calculate_urgency_level, find_forgetting_pattern, get_study_recommendations};
use crate::services::scheduler::{get_standard_interval, MAX_STAGE};
use crate::types::{add_days, Difficulty, ReviewOutcome, ReviewType};

const FORGET_WINDOW_DAYS: i64 = 90;
const MAX_COUNTED_LAPSES: u32 = 3;

#[derive(Debug, Clone)]
pub struct ProblemRecord {
    pub id: i64,
    pub title: String,
    pub difficulty: Difficulty,
    pub pattern_names: Option<String>,
    pub leetcode_link: Option<String>,
}

impl ProblemRecord {
    pub fn new(id: i64, title: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            id,
            title: title.into(),
            difficulty,
            pattern_names: None,
            leetcode_link: None,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredReview {
    entry: ReviewHistoryEntry,
    next_review: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    problems: BTreeMap<i64, ProblemRecord>,
    reviews: Vec<StoredReview>,
    cycles: Vec<IntensiveRecoveryCycle>,
    next_cycle_id: i64,
}

impl State {
    /// Latest review by date; ties go to the most recently recorded one.
    fn latest_review(&self, problem_id: i64) -> Option<&StoredReview> {
        self.reviews
            .iter()
            .filter(|r| r.entry.problem_id == problem_id)
            .max_by_key(|r| r.entry.date)
    }

    fn lapses_since(&self, problem_id: i64, since: DateTime<Utc>) -> usize {
        self.reviews
            .iter()
            .filter(|r| {
                r.entry.problem_id == problem_id
                    && r.entry.result == ReviewOutcome::Forgot
                    && r.entry.date >= since
            })
            .count()
    }

    fn active_cycle_mut(&mut self, problem_id: i64) -> Option<&mut IntensiveRecoveryCycle> {
        self.cycles
            .iter_mut()
            .filter(|c| c.problem_id == problem_id && c.is_active())
            .max_by_key(|c| c.started_date)
    }

    fn push_review(
        &mut self,
        problem_id: i64,
        stage: u8,
        result: ReviewOutcome,
        date: DateTime<Utc>,
        next_review: DateTime<Utc>,
    ) {
        self.reviews.push(StoredReview {
            entry: ReviewHistoryEntry {
                problem_id,
                stage,
                date,
                result,
                forgotten_stage: None,
            },
            next_review,
        });
    }

    /// Records a lapse: the problem restarts on stage 1.
    fn push_lapse(&mut self, problem_id: i64, forgotten_stage: u8, date: DateTime<Utc>, next_review: DateTime<Utc>) {
        self.reviews.push(StoredReview {
            entry: ReviewHistoryEntry {
                problem_id,
                stage: 1,
                date,
                result: ReviewOutcome::Forgot,
                forgotten_stage: Some(forgotten_stage),
            },
            next_review,
        });
    }

    fn insert_cycle(
        &mut self,
        problem_id: i64,
        cycles_remaining: u32,
        cycle_interval_days: u32,
        started_date: DateTime<Utc>,
    ) -> IntensiveRecoveryCycle {
        self.next_cycle_id += 1;
        let cycle = IntensiveRecoveryCycle {
            id: self.next_cycle_id,
            problem_id,
            cycles_remaining,
            cycle_interval_days: cycle_interval_days.max(1),
            started_date,
            completed_date: None,
            initial_cycles: Some(cycles_remaining),
        };
        self.cycles.push(cycle.clone());
        cycle
    }
}

pub struct MemoryReviewStore {
    state: RwLock<State>,
    online: AtomicBool,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            online: AtomicBool::new(true),
        }
    }

    /// A store whose every call fails as if the backend were unreachable.
    pub fn offline() -> Self {
        let store = Self::new();
        store.set_online(false);
        store
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn add_problem(&self, problem: ProblemRecord) {
        self.state.write().problems.insert(problem.id, problem);
    }

    /// Seeds a past review. The next review falls one stage interval later.
    pub fn record_review(&self, problem_id: i64, stage: u8, result: ReviewOutcome, date: DateTime<Utc>) {
        let next_review = add_days(date, get_standard_interval(i64::from(stage)).interval_days);
        self.state
            .write()
            .push_review(problem_id, stage, result, date, next_review);
    }

    /// Moves the latest review's due date. Returns false when the problem has
    /// no history.
    pub fn set_next_review_date(&self, problem_id: i64, next_review: DateTime<Utc>) -> bool {
        let mut state = self.state.write();
        let latest = state
            .reviews
            .iter_mut()
            .filter(|r| r.entry.problem_id == problem_id)
            .max_by_key(|r| r.entry.date);
        match latest {
            Some(review) => {
                review.next_review = next_review;
                true
            }
            None => false,
        }
    }

    pub fn insert_cycle(
        &self,
        problem_id: i64,
        cycles_remaining: u32,
        cycle_interval_days: u32,
        started_date: DateTime<Utc>,
    ) -> IntensiveRecoveryCycle {
        self.state
            .write()
            .insert_cycle(problem_id, cycles_remaining, cycle_interval_days, started_date)
    }

    pub fn active_cycle(&self, problem_id: i64) -> Option<IntensiveRecoveryCycle> {
        self.state
            .read()
            .cycles
            .iter()
            .filter(|c| c.problem_id == problem_id && c.is_active())
            .max_by_key(|c| c.started_date)
            .cloned()
    }

    pub fn cycles(&self) -> Vec<IntensiveRecoveryCycle> {
        self.state.read().cycles.clone()
    }

    pub fn history(&self, problem_id: i64) -> Vec<ReviewHistoryEntry> {
        let mut entries: Vec<ReviewHistoryEntry> = self
            .state
            .read()
            .reviews
            .iter()
            .filter(|r| r.entry.problem_id == problem_id)
            .map(|r| r.entry.clone())
            .collect();
        entries.sort_by_key(|e| e.date);
        entries
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("review store is offline".to_string()))
        }
    }
}

impl Default for MemoryReviewStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cycle_row(
    status: impl Into<String>,
    cycles_remaining: u32,
    next_review_date: DateTime<Utc>,
    graduation_status: &str,
    days_until_normal_cycle: u32,
) -> CycleStatusRow {
    CycleStatusRow {
        status: status.into(),
        cycles_remaining: i64::from(cycles_remaining),
        next_review_date,
        graduation_status: graduation_status.to_string(),
        days_until_normal_cycle: i64::from(days_until_normal_cycle),
    }
}

/// Server-side queue priority: intensive work first, then repeat lapses,
/// then by how overdue the review is.
fn due_priority(review_type: ReviewType, lapses: usize, days_overdue: i64) -> i64 {
    match review_type {
        ReviewType::IntensiveRecovery => 1,
        ReviewType::NormalReview if lapses >= 2 => 2,
        ReviewType::NormalReview if days_overdue > 3 => 3,
        ReviewType::NormalReview if days_overdue > 0 => 4,
        ReviewType::NormalReview => 5,
    }
}

fn recovery_message(times_forgotten: u32, stage: u8, reset_days: i64, reviews: u32, recovery_days: i64) -> String {
    match times_forgotten {
        1 => format!(
            "STANDARD RESET: Forgot at stage {stage}. Reset to {reset_days}-day cycle with {reviews} daily intensive reviews."
        ),
        2 => format!(
            "CONCERNING PATTERN: Second forgetting at stage {stage}. Extended reset with {reviews} daily intensive reviews. Pattern may be conflicting with others."
        ),
        _ => format!(
            "CRITICAL INTERVENTION: Third+ forgetting indicates fundamental pattern breakdown. Intensive {recovery_days}-day recovery needed."
        ),
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn submit_review(&self, request: &SubmitReviewRequest) -> Result<(), StoreError> {
        self.ensure_online()?;
        let now = Utc::now();
        let mut state = self.state.write();

        let current = state.latest_review(request.problem_id).map(|r| r.entry.ladder_stage());
        let stage = match request.result {
            ReviewOutcome::Remembered => request
                .review_stage
                .unwrap_or_else(|| current.map_or(1, |s| s.saturating_add(1).min(MAX_STAGE))),
            ReviewOutcome::Forgot => 1,
        };
        let next_review = request
            .next_review_date
            .unwrap_or_else(|| add_days(now, get_standard_interval(i64::from(stage)).interval_days));

        state.push_review(request.problem_id, stage, request.result, now, next_review);
        debug!(problem_id = request.problem_id, stage, "review recorded");
        Ok(())
    }

    async fn get_due_items(&self, target_date: Option<NaiveDate>) -> Result<Vec<DueReviewRow>, StoreError> {
        self.ensure_online()?;
        let now = Utc::now();
        let target = target_date.unwrap_or_else(|| now.date_naive());
        let window_start = now - Duration::days(FORGET_WINDOW_DAYS);
        let state = self.state.read();

        let problem_ids: BTreeSet<i64> = state
            .problems
            .keys()
            .copied()
            .chain(state.reviews.iter().map(|r| r.entry.problem_id))
            .collect();

        let mut rows = Vec::new();
        for problem_id in problem_ids {
            let latest = state.latest_review(problem_id);
            let in_recovery = state
                .cycles
                .iter()
                .any(|c| c.problem_id == problem_id && c.is_active() && c.cycles_remaining > 0);
            let scheduled = latest.map(|r| r.next_review.date_naive());

            let review_type = if in_recovery {
                ReviewType::IntensiveRecovery
            } else if scheduled.is_some_and(|date| date <= target) {
                ReviewType::NormalReview
            } else {
                continue;
            };

            let days_overdue = scheduled.map_or(0, |date| (target - date).num_days().max(0));
            let lapses = state.lapses_since(problem_id, window_start);
            let problem = state.problems.get(&problem_id);

            rows.push(DueReviewRow {
                problem_id,
                problem_title: problem.map_or_else(|| format!("Problem {problem_id}"), |p| p.title.clone()),
                difficulty: problem.map_or(Difficulty::Medium, |p| p.difficulty).as_str().to_string(),
                review_type: review_type.as_str().to_string(),
                priority: due_priority(review_type, lapses, days_overdue),
                days_overdue,
                last_review_date: latest.map(|r| r.entry.date),
                times_forgotten: lapses as i64,
                pattern_names: problem.and_then(|p| p.pattern_names.clone()),
                leetcode_link: problem.and_then(|p| p.leetcode_link.clone()),
            });
        }

        rows.sort_by_key(|r| (r.priority, Reverse(r.days_overdue), Reverse(r.times_forgotten)));
        Ok(rows)
    }

    async fn get_review_history(&self, problem_id: i64) -> Result<ReviewHistory, StoreError> {
        self.ensure_online()?;
        let next_review_date = self.state.read().latest_review(problem_id).map(|r| r.next_review);
        Ok(ReviewHistory {
            entries: self.history(problem_id),
            next_review_date,
        })
    }

    async fn handle_forgetting(&self, request: &HandleForgettingRequest) -> Result<RecoveryPlanRow, StoreError> {
        self.ensure_online()?;
        let now = Utc::now();
        let stage = request.forgotten_stage.clamp(1, MAX_STAGE);
        let mut state = self.state.write();

        let prior_lapses = state.lapses_since(request.problem_id, now - Duration::days(FORGET_WINDOW_DAYS));
        let times_forgotten = (prior_lapses as u32 + 1).min(MAX_COUNTED_LAPSES);
        let pattern = find_forgetting_pattern(stage, times_forgotten);

        let next_review = add_days(now, pattern.reset_interval_days);
        let recovery_days = i64::from(pattern.intensive_review_count) * pattern.reset_interval_days;

        state.push_lapse(request.problem_id, stage, now, next_review);
        debug!(
            problem_id = request.problem_id,
            stage,
            times_forgotten,
            "forgetting recorded"
        );

        Ok(RecoveryPlanRow {
            recovery_plan: recovery_message(
                times_forgotten,
                stage,
                pattern.reset_interval_days,
                pattern.intensive_review_count,
                recovery_days,
            ),
            next_review_date: next_review,
            intensive_reviews_needed: pattern.intensive_review_count,
            study_recommendations: get_study_recommendations(times_forgotten, stage, &request.specific_mistakes),
            urgency_level: i64::from(calculate_urgency_level(times_forgotten, stage)),
            estimated_recovery_days: recovery_days.max(0) as u32,
        })
    }

    async fn process_intensive_cycle(&self, request: &IntensiveCycleRequest) -> Result<CycleStatusRow, StoreError> {
        self.ensure_online()?;
        let now = Utc::now();
        let mut state = self.state.write();

        let Some(cycle) = state.active_cycle_mut(request.problem_id) else {
            return Ok(cycle_row("No intensive cycle active", 0, now, "Normal review cycle", 0));
        };
        let interval = i64::from(cycle.cycle_interval_days.max(1));

        let (row, graduated) = match request.result {
            ReviewOutcome::Remembered => {
                let remaining = cycle.cycles_remaining.saturating_sub(1);
                cycle.cycles_remaining = remaining;
                if remaining == 0 {
                    cycle.completed_date = Some(now);
                    let row = cycle_row(
                        "GRADUATED from intensive recovery",
                        0,
                        add_days(now, 1),
                        "Ready for normal spaced repetition cycle",
                        0,
                    );
                    (row, true)
                } else {
                    let row = cycle_row(
                        format!("Intensive cycle continues - {remaining} daily reviews remaining"),
                        remaining,
                        add_days(now, interval),
                        "Still in recovery mode",
                        remaining,
                    );
                    (row, false)
                }
            }
            ReviewOutcome::Forgot => {
                let restart = cycle
                    .initial_cycles
                    .unwrap_or_else(|| find_forgetting_pattern(1, 1).intensive_review_count);
                cycle.cycles_remaining = restart;
                cycle.started_date = now;
                let row = cycle_row(
                    "FAILED intensive review - cycle restarted",
                    restart,
                    add_days(now, interval),
                    "Extended recovery needed",
                    restart,
                );
                (row, false)
            }
        };

        state.push_review(request.problem_id, 1, request.result, now, row.next_review_date);
        if graduated {
            debug!(problem_id = request.problem_id, "cycle graduated");
        }
        Ok(row)
    }

    async fn schedule_initial(&self, problem_id: i64) -> Result<InitialScheduleRow, StoreError> {
        self.ensure_online()?;
        let now = Utc::now();
        let scheduled_date = add_days(now, get_standard_interval(1).interval_days);
        self.state
            .write()
            .push_review(problem_id, 1, ReviewOutcome::Remembered, now, scheduled_date);

        Ok(InitialScheduleRow {
            scheduled_date,
            review_stage: 1,
            message: format!(
                "Problem scheduled for first review on {}",
                scheduled_date.format("%Y-%m-%d")
            ),
        })
    }

    async fn get_active_cycles(&self) -> Result<Vec<IntensiveRecoveryCycle>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .state
            .read()
            .cycles
            .iter()
            .filter(|c| c.is_active())
            .cloned()
            .collect())
    }

    async fn create_cycle(&self, request: &CreateCycleRequest) -> Result<IntensiveRecoveryCycle, StoreError> {
        self.ensure_online()?;
        let now = Utc::now();
        let mut state = self.state.write();

        if let Some(cycle) = state.active_cycle_mut(request.problem_id) {
            cycle.cycles_remaining = request.cycles_remaining;
            cycle.cycle_interval_days = request.cycle_interval_days.max(1);
            cycle.initial_cycles = Some(request.cycles_remaining);
            cycle.started_date = now;
            return Ok(cycle.clone());
        }

        Ok(state.insert_cycle(
            request.problem_id,
            request.cycles_remaining,
            request.cycle_interval_days,
            now,
        ))
    }

    async fn complete_cycle(&self, problem_id: i64) -> Result<CycleStatusRow, StoreError> {
        self.ensure_online()?;
        let now = Utc::now();
        let mut state = self.state.write();

        let cycle = state
            .active_cycle_mut(problem_id)
            .ok_or_else(|| StoreError::NotFound(format!("no active recovery cycle for problem {problem_id}")))?;
        cycle.cycles_remaining = 0;
        cycle.completed_date = Some(now);

        state.push_review(problem_id, 1, ReviewOutcome::Remembered, now, add_days(now, 1));
        Ok(cycle_row(
            "GRADUATED from intensive recovery (manual completion)",
            0,
            add_days(now, 1),
            "Ready for normal spaced repetition cycle",
            0,
        ))
    }
}
