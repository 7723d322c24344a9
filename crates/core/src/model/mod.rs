mod ids;
mod progress;
mod session;
mod timing;

pub use ids::{SessionId, UserId};
pub use progress::{
    AdaptiveProgress, CompletedLevel, CustomProgress, CyclePosition, OverallStats, ProgressRecord,
};
pub use session::{PracticeMode, SessionDraft, SessionEntry, SessionValidationError};
pub use timing::BreathTiming;
