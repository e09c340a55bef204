//! Spaced-repetition review scheduling with forgetting recovery and
//! intensive review cycles.

pub mod config;
pub mod logging;
pub mod services;
pub mod store;
pub mod types;

use std::sync::Arc;

pub use config::Config;
pub use services::ReviewOrchestrator;
pub use store::{HttpReviewStore, MemoryReviewStore, ReviewStore, StoreError};
pub use types::{Difficulty, ReviewOutcome, ReviewType, ValidationReport};

/// Loads `.env`, reads the config and installs the tracing subscriber. Keep
/// the returned guard alive for as long as file logs should be flushed.
pub fn init_from_env() -> (Config, Option<logging::FileLogGuard>) {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    let guard = logging::init_tracing(&config);
    tracing::info!(api = %config.api_base_url, "review scheduler configured");
    (config, guard)
}

/// Orchestrator backed by the review REST API.
pub fn create_orchestrator(config: &Config) -> ReviewOrchestrator {
    ReviewOrchestrator::new(Arc::new(HttpReviewStore::new(config)))
}
