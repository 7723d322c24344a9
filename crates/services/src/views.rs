use serde::Serialize;

use breath_core::model::{
    AdaptiveProgress, CustomProgress, OverallStats, ProgressRecord, SessionEntry,
};

/// Aggregate read-only view over a user's progress, useful for API handlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsView {
    pub overall: OverallStats,
    pub adaptive: AdaptiveProgress,
    pub custom: CustomProgress,
    pub recent_sessions: Vec<SessionEntry>,
}

impl StatisticsView {
    #[must_use]
    pub fn from_record(record: ProgressRecord) -> Self {
        Self {
            overall: record.overall,
            adaptive: record.adaptive,
            custom: record.custom,
            recent_sessions: record.recent_sessions,
        }
    }
}

/// Outcome of a badge award attempt. `granted: false` means the badge was
/// already held, which is a success, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BadgeGrant {
    pub granted: bool,
    pub total_badges: usize,
}
