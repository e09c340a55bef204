//! Intensive recovery cycles: short daily review runs a problem must pass
//! before it returns to the normal ladder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::store::{
    CreateCycleRequest, CycleStatusRow, IntensiveCycleRequest, IntensiveRecoveryCycle, ReviewStore,
    StoreError,
};
use crate::types::{
    add_days, days_since, problem_id_error, time_spent_error, ReviewOutcome, ValidationReport,
};

const ON_TRACK_TOLERANCE: f64 = 0.8;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Failed to create intensive recovery cycle: {0}")]
    Create(#[source] StoreError),
    #[error("Failed to complete recovery cycle: {0}")]
    Complete(#[source] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleStatus {
    pub status: String,
    pub cycles_remaining: u32,
    pub next_review_date: DateTime<Utc>,
    pub graduation_status: String,
    pub days_until_normal_cycle: i64,
    #[serde(default)]
    pub offline: bool,
}

impl CycleStatus {
    pub fn has_graduated(&self) -> bool {
        self.cycles_remaining == 0 && self.status.starts_with("GRADUATED")
    }
}

impl From<CycleStatusRow> for CycleStatus {
    fn from(row: CycleStatusRow) -> Self {
        Self {
            status: row.status,
            cycles_remaining: u32::try_from(row.cycles_remaining.max(0)).unwrap_or(u32::MAX),
            next_review_date: row.next_review_date,
            graduation_status: row.graduation_status,
            days_until_normal_cycle: row.days_until_normal_cycle,
            offline: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntensiveReviewResult {
    pub problem_id: i64,
    pub result: ReviewOutcome,
    pub time_spent: Option<i32>,
    pub notes: Option<String>,
    pub cycle_status: CycleStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryProgress {
    pub total_cycles: u32,
    pub completed_cycles: u32,
    pub remaining_cycles: u32,
    pub progress_percentage: u32,
    pub estimated_completion_date: DateTime<Utc>,
    pub is_on_track: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryStatistics {
    pub total_active_problems: usize,
    pub average_cycles_remaining: f64,
    pub problems_near_graduation: usize,
    pub total_recovery_days: i64,
}

pub async fn get_active_recovery_cycles(store: &dyn ReviewStore) -> Vec<IntensiveRecoveryCycle> {
    match store.get_active_cycles().await {
        Ok(cycles) => cycles,
        Err(err) => {
            warn!(error = %err, "Failed to fetch active recovery cycles");
            Vec::new()
        }
    }
}

fn active_cycle_for(
    cycles: Vec<IntensiveRecoveryCycle>,
    problem_id: i64,
) -> Option<IntensiveRecoveryCycle> {
    cycles
        .into_iter()
        .find(|c| c.problem_id == problem_id && c.is_active())
}

pub async fn is_in_intensive_recovery(store: &dyn ReviewStore, problem_id: i64) -> bool {
    let cycles = get_active_recovery_cycles(store).await;
    active_cycle_for(cycles, problem_id).is_some()
}

/// Starts a recovery cycle, or resizes the problem's active one. The store
/// treats this as an upsert, so a problem never ends up with two active
/// cycles.
pub async fn create_recovery_cycle(
    store: &dyn ReviewStore,
    problem_id: i64,
    intensive_review_count: u32,
    cycle_interval_days: u32,
) -> Result<IntensiveRecoveryCycle, CycleError> {
    let existing = active_cycle_for(get_active_recovery_cycles(store).await, problem_id);
    if existing.is_some() {
        info!(problem_id, "Updating existing recovery cycle");
    } else {
        info!(problem_id, "Creating new recovery cycle");
    }

    let request = CreateCycleRequest {
        problem_id,
        cycles_remaining: intensive_review_count,
        cycle_interval_days: cycle_interval_days.max(1),
    };

    store.create_cycle(&request).await.map_err(|err| {
        warn!(problem_id, error = %err, "Failed to create recovery cycle");
        CycleError::Create(err)
    })
}

pub async fn process_intensive_review(
    store: &dyn ReviewStore,
    problem_id: i64,
    result: ReviewOutcome,
    notes: Option<String>,
    time_spent: Option<i32>,
) -> IntensiveReviewResult {
    let request = IntensiveCycleRequest {
        problem_id,
        result,
        notes: notes.clone(),
        time_spent,
    };

    let cycle_status = match store.process_intensive_cycle(&request).await {
        Ok(row) => CycleStatus::from(row),
        Err(err) => {
            warn!(problem_id, error = %err, "intensive-cycle call failed, using local calculation");
            local_cycle_status(result, Utc::now())
        }
    };

    IntensiveReviewResult {
        problem_id,
        result,
        time_spent,
        notes,
        cycle_status,
    }
}

/// Conservative estimate used when the store cannot report the real counter.
pub(crate) fn local_cycle_status(result: ReviewOutcome, now: DateTime<Utc>) -> CycleStatus {
    let (status, cycles_remaining, graduation_status) = match result {
        ReviewOutcome::Remembered => (
            "Intensive cycle continues - estimated cycles remaining",
            2,
            "Still in recovery mode",
        ),
        ReviewOutcome::Forgot => (
            "FAILED intensive review - cycle restarted (offline mode)",
            3,
            "Extended recovery needed",
        ),
    };

    CycleStatus {
        status: status.to_string(),
        cycles_remaining,
        next_review_date: add_days(now, 1),
        graduation_status: graduation_status.to_string(),
        days_until_normal_cycle: i64::from(cycles_remaining),
        offline: true,
    }
}

pub async fn complete_recovery_cycle(
    store: &dyn ReviewStore,
    problem_id: i64,
) -> Result<CycleStatus, CycleError> {
    match store.complete_cycle(problem_id).await {
        Ok(row) => {
            info!(problem_id, "recovery cycle completed");
            Ok(CycleStatus::from(row))
        }
        Err(err) => {
            warn!(problem_id, error = %err, "Failed to complete recovery cycle");
            Err(CycleError::Complete(err))
        }
    }
}

pub async fn get_recovery_progress(
    store: &dyn ReviewStore,
    problem_id: i64,
) -> Option<RecoveryProgress> {
    let cycles = get_active_recovery_cycles(store).await;
    active_cycle_for(cycles, problem_id).map(|cycle| calculate_recovery_progress(&cycle, Utc::now()))
}

pub fn calculate_recovery_progress(
    cycle: &IntensiveRecoveryCycle,
    now: DateTime<Utc>,
) -> RecoveryProgress {
    let days_elapsed = days_since(cycle.started_date, now);
    let interval = cycle.cycle_interval_days.max(1);
    let remaining = cycle.cycles_remaining;

    // Without the starting count, assume one review per elapsed day.
    let total_cycles = match cycle.initial_cycles {
        Some(initial) => initial.max(remaining),
        None => {
            let elapsed = u64::try_from(days_elapsed.max(1)).unwrap_or(u64::MAX);
            u32::try_from(u64::from(remaining).saturating_add(elapsed)).unwrap_or(u32::MAX)
        }
    };
    let completed_cycles = total_cycles - remaining;

    let progress_percentage = if total_cycles > 0 {
        (f64::from(completed_cycles) / f64::from(total_cycles) * 100.0).round() as u32
    } else {
        100
    };

    let expected_completed = days_elapsed as f64 / f64::from(interval);
    let is_on_track = f64::from(completed_cycles) >= expected_completed * ON_TRACK_TOLERANCE;

    RecoveryProgress {
        total_cycles,
        completed_cycles,
        remaining_cycles: remaining,
        progress_percentage,
        estimated_completion_date: add_days(now, i64::from(remaining).saturating_mul(i64::from(interval))),
        is_on_track,
    }
}

pub async fn get_recovery_statistics(store: &dyn ReviewStore) -> RecoveryStatistics {
    match store.get_active_cycles().await {
        Ok(cycles) => summarize_cycles(&cycles, Utc::now()),
        Err(err) => {
            warn!(error = %err, "Failed to get recovery statistics");
            RecoveryStatistics::default()
        }
    }
}

pub fn summarize_cycles(cycles: &[IntensiveRecoveryCycle], now: DateTime<Utc>) -> RecoveryStatistics {
    let total_active_problems = cycles.len();

    let average_cycles_remaining = if total_active_problems > 0 {
        let sum: u64 = cycles.iter().map(|c| u64::from(c.cycles_remaining)).sum();
        let average = sum as f64 / total_active_problems as f64;
        (average * 10.0).round() / 10.0
    } else {
        0.0
    };

    RecoveryStatistics {
        total_active_problems,
        average_cycles_remaining,
        problems_near_graduation: cycles.iter().filter(|c| c.cycles_remaining <= 1).count(),
        total_recovery_days: cycles
            .iter()
            .map(|c| days_since(c.started_date, now))
            .fold(0, i64::saturating_add),
    }
}

pub async fn get_next_intensive_review_date(
    store: &dyn ReviewStore,
    problem_id: i64,
) -> Option<DateTime<Utc>> {
    let cycles = get_active_recovery_cycles(store).await;
    active_cycle_for(cycles, problem_id)
        .map(|cycle| add_days(Utc::now(), i64::from(cycle.cycle_interval_days.max(1))))
}

/// Minutes to budget for an intensive review session.
pub fn get_recommended_study_time(cycles_remaining: u32, urgency_level: u8) -> u32 {
    let base_minutes = match cycles_remaining {
        n if n >= 5 => 30.0,
        n if n >= 3 => 20.0,
        _ => 15.0,
    };
    let urgency_multiplier = f64::from(urgency_level) / 3.0;
    (base_minutes * urgency_multiplier).round() as u32
}

pub fn validate_intensive_review_input(
    problem_id: i64,
    result: &str,
    time_spent: Option<i32>,
) -> ValidationReport {
    let mut errors = Vec::new();
    errors.extend(problem_id_error(problem_id));
    if let Err(message) = result.parse::<ReviewOutcome>() {
        errors.push(message);
    }
    errors.extend(time_spent_error(time_spent));
    ValidationReport::from_errors(errors)
}
