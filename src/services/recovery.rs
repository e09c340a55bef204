use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::{HandleForgettingRequest, ReviewHistoryEntry, ReviewStore};
use crate::types::{add_days, ReviewOutcome};

const RECENT_WINDOW_DAYS: i64 = 90;
const MAX_PATTERN_COUNT: u32 = 3;
const OFFLINE_SUFFIX: &str = " (Offline mode - limited analysis)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgettingPattern {
    pub stage_forgotten: u8,
    pub times_forgotten: u32,
    pub reset_interval_days: i64,
    pub intensive_review_count: u32,
    pub recovery_notes: &'static str,
}

const fn pattern(
    stage_forgotten: u8,
    times_forgotten: u32,
    reset_interval_days: i64,
    intensive_review_count: u32,
    recovery_notes: &'static str,
) -> ForgettingPattern {
    ForgettingPattern {
        stage_forgotten,
        times_forgotten,
        reset_interval_days,
        intensive_review_count,
        recovery_notes,
    }
}

pub const FORGETTING_PATTERNS: [ForgettingPattern; 14] = [
    // first lapse
    pattern(1, 1, 1, 2, "Forgot at 1-day mark: Pattern not consolidated - restart with 2 daily intensive reviews"),
    pattern(2, 1, 1, 3, "Forgot at 3-day critical cliff: Memory pathway weak - needs 3 daily intensive reviews"),
    pattern(3, 1, 2, 2, "Forgot at 7-day mark: Interference likely - moderate reset with 2 intensive reviews"),
    pattern(4, 1, 3, 2, "Forgot at 14-day mark: Pattern confusion - 3-day reset with reinforcement"),
    pattern(5, 1, 7, 1, "Forgot at 30-day mark: Long-term memory issue - weekly reset"),
    pattern(6, 1, 14, 1, "Forgot at 60+ day mark: Deep pattern forgotten - bi-weekly reset"),
    // second lapse
    pattern(1, 2, 1, 4, "Second 1-day failure: Serious consolidation problem - 4 daily intensive reviews needed"),
    pattern(2, 2, 1, 5, "Second 3-day failure: Major memory pathway issue - 5 daily intensive cycles"),
    pattern(3, 2, 2, 3, "Second 7-day failure: Pattern interference - extended intensive period"),
    pattern(4, 2, 3, 3, "Second 14-day failure: Conceptual confusion - daily reviews for 3 days"),
    // third and later
    pattern(1, 3, 1, 6, "Third+ 1-day failure: CRITICAL - needs pattern re-learning with 6 daily intensive reviews"),
    pattern(2, 3, 1, 8, "Third+ 3-day failure: CRITICAL - complete pattern breakdown, 8 daily intensive cycles"),
    pattern(3, 3, 1, 5, "Third+ 7-day failure: CRITICAL - fundamental pattern confusion, daily practice needed"),
    pattern(4, 3, 2, 4, "Third+ 14-day failure: CRITICAL - needs structured daily pattern study"),
];

/// Lookup rules, tried in order until one matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternMatchRule {
    Exact,
    CountOnly,
    TableDefault,
}

const MATCH_RULES: [PatternMatchRule; 3] = [
    PatternMatchRule::Exact,
    PatternMatchRule::CountOnly,
    PatternMatchRule::TableDefault,
];

impl PatternMatchRule {
    fn matches(self, candidate: &ForgettingPattern, stage: u8, capped_count: u32) -> bool {
        match self {
            Self::Exact => {
                candidate.stage_forgotten == stage && candidate.times_forgotten == capped_count
            }
            Self::CountOnly => candidate.times_forgotten == capped_count,
            Self::TableDefault => true,
        }
    }
}

/// Always returns a pattern: exact match, then any stage with the same
/// count, then the first table entry.
pub fn find_forgetting_pattern(stage: u8, times_forgotten: u32) -> ForgettingPattern {
    let capped_count = times_forgotten.min(MAX_PATTERN_COUNT);

    MATCH_RULES
        .iter()
        .find_map(|rule| {
            FORGETTING_PATTERNS
                .iter()
                .find(|p| rule.matches(p, stage, capped_count))
        })
        .copied()
        .unwrap_or(FORGETTING_PATTERNS[0])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPlan {
    pub recovery_plan: String,
    pub next_review_date: DateTime<Utc>,
    pub intensive_reviews_needed: u32,
    pub study_recommendations: Vec<String>,
    pub urgency_level: u8,
    pub estimated_recovery_days: u32,
    /// Set when the plan was computed locally because the store was
    /// unreachable.
    #[serde(default)]
    pub offline: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ForgettingEventData {
    pub problem_id: i64,
    pub forgotten_stage: u8,
    pub time_spent: Option<i32>,
    pub confusion_notes: Option<String>,
    pub specific_mistakes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Continue,
    Intensive,
    Reset,
    SeekHelp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgettingAnalysis {
    pub forgetting_frequency: usize,
    pub problematic_stages: Vec<u8>,
    pub recovery_effectiveness: f64,
    pub recommended_action: RecommendedAction,
}

/// Builds a recovery plan for a forgetting event. The store may apply
/// history-aware logic; when it cannot be reached the plan is computed
/// locally assuming a first lapse.
pub async fn handle_forgetting_event(store: &dyn ReviewStore, data: &ForgettingEventData) -> RecoveryPlan {
    let request = HandleForgettingRequest {
        problem_id: data.problem_id,
        forgotten_stage: data.forgotten_stage,
        time_spent: data.time_spent,
        confusion_notes: data.confusion_notes.clone(),
        specific_mistakes: data.specific_mistakes.clone(),
    };

    let remote = store.handle_forgetting(&request).await;

    match remote {
        Ok(row) => RecoveryPlan {
            recovery_plan: row.recovery_plan,
            next_review_date: row.next_review_date,
            intensive_reviews_needed: row.intensive_reviews_needed,
            study_recommendations: row.study_recommendations,
            urgency_level: row.urgency_level.clamp(1, 5) as u8,
            estimated_recovery_days: row.estimated_recovery_days,
            offline: false,
        },
        Err(err) => {
            warn!(
                problem_id = data.problem_id,
                error = %err,
                "handle_forgetting failed, using local calculation"
            );
            local_recovery_plan(data, Utc::now())
        }
    }
}

pub(crate) fn local_recovery_plan(data: &ForgettingEventData, now: DateTime<Utc>) -> RecoveryPlan {
    // No history is available locally, so assume a first lapse.
    let times_forgotten = 1;

    let pattern = find_forgetting_pattern(data.forgotten_stage, times_forgotten);
    let urgency_level = calculate_urgency_level(times_forgotten, data.forgotten_stage);
    let study_recommendations =
        get_study_recommendations(times_forgotten, data.forgotten_stage, &data.specific_mistakes);
    let estimated_recovery_days = estimate_recovery_time(
        pattern.intensive_review_count,
        pattern.reset_interval_days,
        times_forgotten,
    );

    debug!(
        problem_id = data.problem_id,
        stage = data.forgotten_stage,
        reviews = pattern.intensive_review_count,
        "local recovery plan computed"
    );

    RecoveryPlan {
        recovery_plan: format!("{}{}", pattern.recovery_notes, OFFLINE_SUFFIX),
        next_review_date: add_days(now, pattern.reset_interval_days),
        intensive_reviews_needed: pattern.intensive_review_count,
        study_recommendations,
        urgency_level,
        estimated_recovery_days,
        offline: true,
    }
}

pub fn analyze_forgetting_patterns(history: &[ReviewHistoryEntry]) -> ForgettingAnalysis {
    analyze_forgetting_patterns_at(history, Utc::now())
}

pub fn analyze_forgetting_patterns_at(
    history: &[ReviewHistoryEntry],
    now: DateTime<Utc>,
) -> ForgettingAnalysis {
    let total_reviews = history.len();
    let recent_cutoff = now - Duration::days(RECENT_WINDOW_DAYS);

    let forgetting_events: Vec<&ReviewHistoryEntry> = history
        .iter()
        .filter(|h| h.result == ReviewOutcome::Forgot)
        .collect();

    let forgetting_frequency = forgetting_events
        .iter()
        .filter(|e| e.date >= recent_cutoff)
        .count();

    let mut stage_frequency: BTreeMap<u8, usize> = BTreeMap::new();
    for event in &forgetting_events {
        *stage_frequency.entry(event.reviewed_stage()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(u8, usize)> = stage_frequency
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    let problematic_stages: Vec<u8> = ranked.into_iter().map(|(stage, _)| stage).collect();

    let recovery_effectiveness = if total_reviews > 0 {
        let remembered = history
            .iter()
            .filter(|h| h.result == ReviewOutcome::Remembered)
            .count();
        remembered as f64 / total_reviews as f64 * 100.0
    } else {
        0.0
    };

    let recommended_action = if forgetting_frequency >= 3 {
        RecommendedAction::SeekHelp
    } else if forgetting_frequency >= 2 || problematic_stages.len() >= 2 {
        RecommendedAction::Intensive
    } else if recovery_effectiveness < 50.0 && total_reviews >= 5 {
        RecommendedAction::Reset
    } else {
        RecommendedAction::Continue
    };

    ForgettingAnalysis {
        forgetting_frequency,
        problematic_stages,
        recovery_effectiveness,
        recommended_action,
    }
}

pub fn get_study_recommendations(
    times_forgotten: u32,
    stage: u8,
    specific_mistakes: &[String],
) -> Vec<String> {
    let mut recommendations: Vec<String> = Vec::new();
    recommendations.extend(severity_recommendations(times_forgotten).iter().map(|s| s.to_string()));
    recommendations.extend(stage_recommendations(stage).iter().map(|s| s.to_string()));
    recommendations.extend(mistake_recommendations(specific_mistakes));
    recommendations
}

fn severity_recommendations(times_forgotten: u32) -> &'static [&'static str] {
    match times_forgotten {
        1 => &[
            "Review the base pattern theory today",
            "Write out the algorithm step-by-step",
            "Practice 1-2 similar problems",
            "Focus on the key insight you missed",
        ],
        2 => &[
            "STUDY THE PATTERN FUNDAMENTALS TODAY",
            "Watch video explanation of the pattern",
            "Code the pattern template from memory",
            "Practice 3-4 similar problems this week",
            "Identify what specific part confuses you",
        ],
        _ => &[
            "CRITICAL: COMPLETE PATTERN RE-LEARNING NEEDED",
            "Schedule focused study session (45+ minutes today)",
            "Start with easiest problems in this pattern",
            "Create your own pattern template/cheatsheet",
            "Practice 5+ similar problems over next week",
            "Consider getting additional learning resources",
        ],
    }
}

fn stage_recommendations(stage: u8) -> &'static [&'static str] {
    if stage <= 2 {
        &[
            "Focus on pattern recognition - the basic concept is not solid",
            "Practice the pattern on paper before coding",
            "Review similar problems you've solved successfully",
        ]
    } else if stage <= 4 {
        &[
            "Check for pattern interference with similar concepts",
            "Create a comparison chart with related patterns",
            "Practice edge cases and variations",
        ]
    } else {
        &[
            "Review the problem from first principles",
            "Check if the pattern has evolved or you learned new approaches",
            "Consider if this is still the optimal solution method",
        ]
    }
}

const MISTAKE_KEYWORDS: [(&[&str], &str); 4] = [
    (
        &["edge case", "boundary"],
        "Practice edge cases: empty arrays, single elements, duplicates",
    ),
    (
        &["time", "complexity"],
        "Review time complexity analysis and optimization techniques",
    ),
    (
        &["logic", "algorithm"],
        "Trace through the algorithm step-by-step with examples",
    ),
    (
        &["syntax", "implementation"],
        "Practice coding the pattern template until it's automatic",
    ),
];

fn mistake_recommendations(mistakes: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for mistake in mistakes {
        let lower = mistake.to_lowercase();
        for (keywords, advice) in MISTAKE_KEYWORDS {
            if keywords.iter().any(|k| lower.contains(k)) {
                out.push(advice.to_string());
            }
        }
    }
    out
}

pub fn calculate_urgency_level(times_forgotten: u32, stage: u8) -> u8 {
    if times_forgotten >= 3 {
        5
    } else if times_forgotten >= 2 || stage <= 2 {
        4
    } else if stage <= 4 {
        3
    } else {
        2
    }
}

pub fn estimate_recovery_time(
    intensive_review_count: u32,
    reset_interval_days: i64,
    times_forgotten: u32,
) -> u32 {
    let base_days = intensive_review_count as f64 * reset_interval_days as f64;
    let complexity_multiplier = (times_forgotten as f64 * 0.5).min(2.0);
    (base_days * (1.0 + complexity_multiplier)).ceil().max(0.0) as u32
}
