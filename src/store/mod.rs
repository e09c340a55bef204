//! Contract with the persistence collaborator.
//!
//! Every call here may fail; the services layer decides whether a failure is
//! replaced by a local computation or surfaced to the caller.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ReviewOutcome;

pub mod http;
pub mod memory;
pub(crate) mod wire_date;

pub use http::HttpReviewStore;
pub use memory::MemoryReviewStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("review store unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReviewRequest {
    pub problem_id: i64,
    pub result: ReviewOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Stage and date the client scheduled; the store computes its own when
    /// absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_stage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_review_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandleForgettingRequest {
    pub problem_id: i64,
    pub forgotten_stage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confusion_notes: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub specific_mistakes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntensiveCycleRequest {
    pub problem_id: i64,
    pub result: ReviewOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCycleRequest {
    pub problem_id: i64,
    pub cycles_remaining: u32,
    pub cycle_interval_days: u32,
}

/// One row of the collaborator's due-today list.
#[derive(Debug, Clone, Deserialize)]
pub struct DueReviewRow {
    pub problem_id: i64,
    #[serde(default)]
    pub problem_title: String,
    #[serde(default)]
    pub difficulty: String,
    pub review_type: String,
    pub priority: i64,
    #[serde(default)]
    pub days_overdue: i64,
    #[serde(default, deserialize_with = "wire_date::deserialize_option")]
    pub last_review_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub times_forgotten: i64,
    #[serde(default)]
    pub pattern_names: Option<String>,
    #[serde(default)]
    pub leetcode_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewHistoryEntry {
    pub problem_id: i64,
    #[serde(alias = "review_stage")]
    pub stage: u8,
    #[serde(alias = "review_date", deserialize_with = "wire_date::deserialize")]
    pub date: DateTime<Utc>,
    pub result: ReviewOutcome,
    /// Ladder stage the problem was at when a lapse reset it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forgotten_stage: Option<u8>,
}

impl ReviewHistoryEntry {
    /// Stage the review was taken at, before any lapse reset.
    pub fn reviewed_stage(&self) -> u8 {
        self.forgotten_stage.unwrap_or(self.stage)
    }

    /// Ladder stage the problem sits on after this review. A lapse puts it
    /// back on stage 1 whatever stage it was recorded at.
    pub fn ladder_stage(&self) -> u8 {
        match self.result {
            ReviewOutcome::Forgot => 1,
            ReviewOutcome::Remembered => self.stage,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewHistory {
    #[serde(default, alias = "history", alias = "reviews")]
    pub entries: Vec<ReviewHistoryEntry>,
    #[serde(default, deserialize_with = "wire_date::deserialize_option")]
    pub next_review_date: Option<DateTime<Utc>>,
}

impl ReviewHistory {
    /// Entries sorted oldest first. The collaborator may return either order.
    pub fn chronological(&self) -> Vec<ReviewHistoryEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|e| e.date);
        entries
    }

    pub fn latest(&self) -> Option<&ReviewHistoryEntry> {
        self.entries.iter().max_by_key(|e| e.date)
    }

    /// Ladder stage after the most recent review, if any.
    pub fn current_stage(&self) -> Option<u8> {
        self.latest().map(ReviewHistoryEntry::ladder_stage)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryPlanRow {
    pub recovery_plan: String,
    #[serde(deserialize_with = "wire_date::deserialize")]
    pub next_review_date: DateTime<Utc>,
    pub intensive_reviews_needed: u32,
    #[serde(default)]
    pub study_recommendations: Vec<String>,
    pub urgency_level: i64,
    pub estimated_recovery_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CycleStatusRow {
    pub status: String,
    pub cycles_remaining: i64,
    #[serde(deserialize_with = "wire_date::deserialize")]
    pub next_review_date: DateTime<Utc>,
    pub graduation_status: String,
    pub days_until_normal_cycle: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitialScheduleRow {
    #[serde(deserialize_with = "wire_date::deserialize")]
    pub scheduled_date: DateTime<Utc>,
    pub review_stage: u8,
    pub message: String,
}

/// An intensive recovery cycle as stored by the collaborator. Accepts both
/// camelCase and snake_case field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntensiveRecoveryCycle {
    pub id: i64,
    #[serde(alias = "problem_id")]
    pub problem_id: i64,
    #[serde(alias = "cycles_remaining")]
    pub cycles_remaining: u32,
    #[serde(alias = "cycle_interval_days")]
    pub cycle_interval_days: u32,
    #[serde(alias = "started_date", deserialize_with = "wire_date::deserialize")]
    pub started_date: DateTime<Utc>,
    #[serde(
        default,
        alias = "completed_date",
        deserialize_with = "wire_date::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_date: Option<DateTime<Utc>>,
    /// Cycle count the recovery started with, when the collaborator keeps it.
    #[serde(default, alias = "initial_cycles", skip_serializing_if = "Option::is_none")]
    pub initial_cycles: Option<u32>,
}

impl IntensiveRecoveryCycle {
    pub fn is_active(&self) -> bool {
        self.completed_date.is_none()
    }
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn submit_review(&self, request: &SubmitReviewRequest) -> Result<(), StoreError>;

    async fn get_due_items(
        &self,
        target_date: Option<NaiveDate>,
    ) -> Result<Vec<DueReviewRow>, StoreError>;

    async fn get_review_history(&self, problem_id: i64) -> Result<ReviewHistory, StoreError>;

    async fn handle_forgetting(
        &self,
        request: &HandleForgettingRequest,
    ) -> Result<RecoveryPlanRow, StoreError>;

    async fn process_intensive_cycle(
        &self,
        request: &IntensiveCycleRequest,
    ) -> Result<CycleStatusRow, StoreError>;

    async fn schedule_initial(&self, problem_id: i64) -> Result<InitialScheduleRow, StoreError>;

    async fn get_active_cycles(&self) -> Result<Vec<IntensiveRecoveryCycle>, StoreError>;

    /// Creates a cycle, or updates the problem's active cycle if one exists.
    async fn create_cycle(
        &self,
        request: &CreateCycleRequest,
    ) -> Result<IntensiveRecoveryCycle, StoreError>;

    async fn complete_cycle(&self, problem_id: i64) -> Result<CycleStatusRow, StoreError>;
}
