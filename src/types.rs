use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const MILLIS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Outcome the learner reports for a single review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewOutcome {
    Remembered,
    Forgot,
}

impl ReviewOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remembered => "remembered",
            Self::Forgot => "forgot",
        }
    }
}

impl fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remembered" => Ok(Self::Remembered),
            "forgot" => Ok(Self::Forgot),
            _ => Err(r#"Result must be either "remembered" or "forgot""#.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewType {
    NormalReview,
    IntensiveRecovery,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NormalReview => "NORMAL_REVIEW",
            Self::IntensiveRecovery => "INTENSIVE_RECOVERY",
        }
    }
}

impl FromStr for ReviewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NORMAL_REVIEW" => Ok(Self::NormalReview),
            "INTENSIVE_RECOVERY" => Ok(Self::IntensiveRecovery),
            other => Err(format!("unknown review type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// Result of a validation pass. Validation never throws; callers inspect
/// `errors` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

pub(crate) const MAX_TIME_SPENT_MINUTES: i32 = 300;

pub(crate) fn problem_id_error(problem_id: i64) -> Option<String> {
    (problem_id <= 0).then(|| "Valid problem ID is required".to_string())
}

pub(crate) fn time_spent_error(time_spent: Option<i32>) -> Option<String> {
    match time_spent {
        Some(minutes) if !(0..=MAX_TIME_SPENT_MINUTES).contains(&minutes) => {
            Some(format!("Time spent must be between 0 and {MAX_TIME_SPENT_MINUTES} minutes"))
        }
        _ => None,
    }
}

/// `date` shifted by `days`, saturating at the representable range.
pub(crate) fn add_days(date: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .unwrap_or(if days < 0 { DateTime::<Utc>::MIN_UTC } else { DateTime::<Utc>::MAX_UTC })
}

/// Whole days from `now` until `target`, rounded up.
pub(crate) fn days_until(now: DateTime<Utc>, target: DateTime<Utc>) -> i64 {
    let diff_ms = (target - now).num_milliseconds() as f64;
    (diff_ms / MILLIS_PER_DAY).ceil() as i64
}

/// Whole days elapsed since `start`, rounded down.
pub(crate) fn days_since(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let diff_ms = (now - start).num_milliseconds() as f64;
    (diff_ms / MILLIS_PER_DAY).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_outcome_parsing() {
        assert_eq!("remembered".parse::<ReviewOutcome>(), Ok(ReviewOutcome::Remembered));
        assert_eq!("forgot".parse::<ReviewOutcome>(), Ok(ReviewOutcome::Forgot));
        assert!("Forgot".parse::<ReviewOutcome>().is_err());
        assert!("maybe".parse::<ReviewOutcome>().is_err());
    }

    #[test]
    fn test_review_type_wire_names() {
        let json = serde_json::to_string(&ReviewType::IntensiveRecovery).unwrap();
        assert_eq!(json, "\"INTENSIVE_RECOVERY\"");
        assert_eq!("NORMAL_REVIEW".parse::<ReviewType>(), Ok(ReviewType::NormalReview));
    }

    #[test]
    fn test_day_arithmetic() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 3, 13, 0, 0).unwrap();
        assert_eq!(days_since(start, later), 2);
        assert_eq!(days_until(start, later), 3);
        assert_eq!(add_days(start, 5), Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_add_days_saturates() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(add_days(start, i64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(add_days(start, 100_000_000), DateTime::<Utc>::MAX_UTC);
        assert_eq!(add_days(start, i64::MIN), DateTime::<Utc>::MIN_UTC);
        assert_eq!(add_days(start, -100_000_000), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_time_spent_bounds() {
        assert!(time_spent_error(None).is_none());
        assert!(time_spent_error(Some(0)).is_none());
        assert!(time_spent_error(Some(300)).is_none());
        assert!(time_spent_error(Some(301)).is_some());
        assert!(time_spent_error(Some(-1)).is_some());
    }
}
