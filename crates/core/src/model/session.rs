use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{BreathTiming, SessionId};

/// Which tracking mode a session feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PracticeMode {
    Adaptive,
    Custom,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionValidationError {
    #[error("session_id is required")]
    MissingSessionId,

    #[error("mode is required")]
    MissingMode,

    #[error("start_time is required")]
    MissingStartTime,

    #[error("end_time is required")]
    MissingEndTime,

    #[error("cycles_completed is required")]
    MissingCycles,

    #[error("cycles_completed must be >= 0, got {got}")]
    NegativeCycles { got: i64 },

    #[error("practice_time_secs must be >= 0, got {got}")]
    NegativePracticeTime { got: i64 },

    #[error("end_time is before start_time")]
    InvalidTimeRange,
}

/// Client-reported session payload before validation.
///
/// All fields are optional at the wire level; `validate` enforces which ones
/// are required and converts the draft into an immutable [`SessionEntry`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionDraft {
    pub session_id: Option<String>,
    pub mode: Option<PracticeMode>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub cycles_completed: Option<i64>,
    pub practice_time_secs: Option<i64>,
    pub timing: Option<BreathTiming>,
    pub set_number: Option<u32>,
    pub level_number: Option<u32>,
    pub difficulty_level: Option<u32>,
    pub notes: Option<String>,
}

impl SessionDraft {
    /// Validate the draft and build a [`SessionEntry`].
    ///
    /// # Errors
    ///
    /// Returns `SessionValidationError` if a required field is missing, a
    /// count is negative, or `end_time` precedes `start_time`. No state is
    /// touched on rejection.
    pub fn validate(self) -> Result<SessionEntry, SessionValidationError> {
        let session_id = self
            .session_id
            .filter(|id| !id.is_empty())
            .ok_or(SessionValidationError::MissingSessionId)?;
        let mode = self.mode.ok_or(SessionValidationError::MissingMode)?;
        let start_time = self
            .start_time
            .ok_or(SessionValidationError::MissingStartTime)?;
        let end_time = self.end_time.ok_or(SessionValidationError::MissingEndTime)?;
        let cycles = self
            .cycles_completed
            .ok_or(SessionValidationError::MissingCycles)?;

        if end_time < start_time {
            return Err(SessionValidationError::InvalidTimeRange);
        }
        let cycles_completed = u32::try_from(cycles)
            .map_err(|_| SessionValidationError::NegativeCycles { got: cycles })?;
        let practice_time = self.practice_time_secs.unwrap_or(0);
        let practice_time_secs = u64::try_from(practice_time)
            .map_err(|_| SessionValidationError::NegativePracticeTime { got: practice_time })?;

        Ok(SessionEntry {
            session_id: SessionId::new(session_id),
            mode,
            start_time,
            end_time,
            cycles_completed,
            practice_time_secs,
            timing: self.timing.unwrap_or_default(),
            set_number: self.set_number,
            level_number: self.level_number,
            difficulty_level: self.difficulty_level,
            badges_earned: Vec::new(),
            notes: self.notes,
        })
    }
}

/// One completed session in a record's history. Immutable once created;
/// built through [`SessionDraft::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    session_id: SessionId,
    mode: PracticeMode,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    cycles_completed: u32,
    practice_time_secs: u64,
    timing: BreathTiming,
    set_number: Option<u32>,
    level_number: Option<u32>,
    difficulty_level: Option<u32>,
    badges_earned: Vec<String>,
    notes: Option<String>,
}

impl SessionEntry {
    /// Build a synthetic entry summarizing a batch of completed levels.
    ///
    /// Only the cycle/level accumulator creates these; client-reported
    /// entries always go through [`SessionDraft::validate`].
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn synthetic(
        session_id: SessionId,
        mode: PracticeMode,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        cycles_completed: u32,
        practice_time_secs: u64,
        timing: BreathTiming,
        level_number: Option<u32>,
        notes: Option<String>,
    ) -> Self {
        Self {
            session_id,
            mode,
            start_time,
            end_time,
            cycles_completed,
            practice_time_secs,
            timing,
            set_number: None,
            level_number,
            difficulty_level: None,
            badges_earned: Vec::new(),
            notes,
        }
    }

    /// Attach the badges granted while recording this entry.
    ///
    /// Used between validation and history insertion; the entry is immutable
    /// once it lands in `recent_sessions`.
    #[must_use]
    pub fn with_badges_earned(mut self, badges: Vec<String>) -> Self {
        self.badges_earned = badges;
        self
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn mode(&self) -> PracticeMode {
        self.mode
    }

    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    #[must_use]
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    #[must_use]
    pub fn cycles_completed(&self) -> u32 {
        self.cycles_completed
    }

    #[must_use]
    pub fn practice_time_secs(&self) -> u64 {
        self.practice_time_secs
    }

    #[must_use]
    pub fn timing(&self) -> BreathTiming {
        self.timing
    }

    #[must_use]
    pub fn set_number(&self) -> Option<u32> {
        self.set_number
    }

    #[must_use]
    pub fn level_number(&self) -> Option<u32> {
        self.level_number
    }

    #[must_use]
    pub fn difficulty_level(&self) -> Option<u32> {
        self.difficulty_level
    }

    #[must_use]
    pub fn badges_earned(&self) -> &[String] {
        &self.badges_earned
    }

    #[must_use]
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}
