pub mod intensive;
pub mod recovery;
pub mod review;
pub mod scheduler;

pub use intensive::{CycleError, CycleStatus, IntensiveReviewResult, RecoveryProgress, RecoveryStatistics};
pub use recovery::{ForgettingAnalysis, ForgettingEventData, RecommendedAction, RecoveryPlan};
pub use review::{DailyReviewItem, ReviewAction, ReviewOrchestrator, ReviewResult, ReviewStatistics};
pub use scheduler::{CustomReviewOptions, IntervalStage, ReviewScheduleResult, SchedulerError};
