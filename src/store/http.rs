use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, warn};

use super::{
    CreateCycleRequest, CycleStatusRow, DueReviewRow, HandleForgettingRequest, InitialScheduleRow,
    IntensiveCycleRequest, IntensiveRecoveryCycle, RecoveryPlanRow, ReviewHistory,
    ReviewHistoryEntry, ReviewStore, StoreError, SubmitReviewRequest,
};
use crate::config::Config;

const BASE_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_SHIFT: usize = 5;

/// The history endpoint answers either with a wrapped object or a bare list
/// of rows.
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryPayload {
    Bare(Vec<ReviewHistoryEntry>),
    Wrapped(ReviewHistory),
}

#[derive(Serialize)]
struct ProblemRef {
    problem_id: i64,
}

/// `ReviewStore` backed by the review REST API.
#[derive(Clone)]
pub struct HttpReviewStore {
    base_url: String,
    api_token: Option<String>,
    max_retries: usize,
    client: reqwest::Client,
}

impl HttpReviewStore {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            max_retries: config.max_retries,
            client,
        }
    }

    pub fn from_env() -> Self {
        Self::new(&Config::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// GETs are idempotent, so transport errors and retryable statuses are
    /// retried with exponential backoff.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        let url = self.url(path);
        let mut retry = 0;

        loop {
            let err = match self.authorize(self.client.get(&url)).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return decode(resp).await;
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = StoreError::HttpStatus { status, body };
                    if !is_retryable(status) {
                        return Err(err);
                    }
                    err
                }
                Err(e) => StoreError::Request(e),
            };

            if retry >= self.max_retries {
                return Err(err);
            }
            let backoff = Duration::from_millis(BASE_BACKOFF_MS << retry.min(MAX_BACKOFF_SHIFT));
            warn!(retry, path, error = %err, "review API request failed, retrying");
            sleep(backoff).await;
            retry += 1;
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, StoreError> {
        let resp = self
            .authorize(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::HttpStatus { status, body })
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, StoreError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self.post(path, body).await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, StoreError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        let body = String::from_utf8_lossy(&bytes);
        error!("Failed to parse review API response JSON: {}. Body: {}", e, body);
        StoreError::Json(e)
    })
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[async_trait]
impl ReviewStore for HttpReviewStore {
    async fn submit_review(&self, request: &SubmitReviewRequest) -> Result<(), StoreError> {
        self.post("/api/reviews", request).await?;
        Ok(())
    }

    async fn get_due_items(
        &self,
        target_date: Option<NaiveDate>,
    ) -> Result<Vec<DueReviewRow>, StoreError> {
        let path = match target_date {
            Some(date) => format!("/api/reviews/due-today?date={}", date.format("%Y-%m-%d")),
            None => "/api/reviews/due-today".to_string(),
        };
        self.get_json(&path).await
    }

    async fn get_review_history(&self, problem_id: i64) -> Result<ReviewHistory, StoreError> {
        let payload: HistoryPayload = self
            .get_json(&format!("/api/reviews/history/{problem_id}"))
            .await?;
        Ok(match payload {
            HistoryPayload::Wrapped(history) => history,
            HistoryPayload::Bare(entries) => ReviewHistory {
                entries,
                next_review_date: None,
            },
        })
    }

    async fn handle_forgetting(
        &self,
        request: &HandleForgettingRequest,
    ) -> Result<RecoveryPlanRow, StoreError> {
        self.post_json("/api/reviews/handle-forgetting", request).await
    }

    async fn process_intensive_cycle(
        &self,
        request: &IntensiveCycleRequest,
    ) -> Result<CycleStatusRow, StoreError> {
        self.post_json("/api/reviews/intensive-cycle", request).await
    }

    async fn schedule_initial(&self, problem_id: i64) -> Result<InitialScheduleRow, StoreError> {
        self.post_json("/api/reviews/schedule-initial", &ProblemRef { problem_id })
            .await
    }

    async fn get_active_cycles(&self) -> Result<Vec<IntensiveRecoveryCycle>, StoreError> {
        self.get_json("/api/reviews/active-cycles").await
    }

    async fn create_cycle(
        &self,
        request: &CreateCycleRequest,
    ) -> Result<IntensiveRecoveryCycle, StoreError> {
        self.post_json("/api/reviews/create-cycle", request).await
    }

    async fn complete_cycle(&self, problem_id: i64) -> Result<CycleStatusRow, StoreError> {
        self.post_json("/api/reviews/complete-cycle", &ProblemRef { problem_id })
            .await
    }
}
