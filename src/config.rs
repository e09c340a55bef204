use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:3001";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_RETRIES: usize = 2;
const DEFAULT_LOG_DIR: &str = "./logs";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    pub max_retries: usize,
    pub log_level: String,
    pub file_logs_enabled: bool,
    pub log_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            log_level: "info".to_string(),
            file_logs_enabled: false,
            log_dir: DEFAULT_LOG_DIR.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Missing or unparsable
    /// values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_base_url = value("REVIEW_API_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let api_token = value("REVIEW_API_TOKEN");

        let timeout_ms = value("REVIEW_API_TIMEOUT_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let max_retries = value("REVIEW_API_MAX_RETRIES")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let log_level = value("RUST_LOG").unwrap_or_else(|| "info".to_string());

        let file_logs_enabled = value("ENABLE_FILE_LOGS").is_some_and(|v| is_truthy(&v));
        let log_dir = value("LOG_DIR")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string());

        Self {
            api_base_url,
            api_token,
            request_timeout: Duration::from_millis(timeout_ms),
            max_retries,
            log_level,
            file_logs_enabled,
            log_dir,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "true" | "1")
}
