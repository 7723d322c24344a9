use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CYCLES_PER_LEVEL, RECENT_SESSIONS_DEPTH};
use crate::model::{BreathTiming, PracticeMode, SessionEntry, SessionId, UserId};
use crate::streak;

/// Leveled-practice side of a progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveProgress {
    pub enabled: bool,
    pub current_level: u32,
    pub current_cycle_in_level: u32,
    pub total_cycles_completed: u64,
    pub total_sessions_completed: u64,
    pub total_practice_time_secs: u64,
    pub longest_session_cycles: u32,
    pub last_session_timing: BreathTiming,
    pub frozen_difficulty_level: Option<u32>,
    pub badges: BTreeSet<String>,
    pub current_streak: u32,
    pub longest_streak: u32,
}

impl Default for AdaptiveProgress {
    fn default() -> Self {
        Self {
            enabled: true,
            current_level: 1,
            current_cycle_in_level: 1,
            total_cycles_completed: 0,
            total_sessions_completed: 0,
            total_practice_time_secs: 0,
            longest_session_cycles: 0,
            last_session_timing: BreathTiming::default(),
            frozen_difficulty_level: None,
            badges: BTreeSet::new(),
            current_streak: 0,
            longest_streak: 0,
        }
    }
}

/// Free-form practice side of a progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomProgress {
    pub active: bool,
    pub timing: BreathTiming,
    pub total_cycles: u64,
    pub total_sessions: u64,
    pub total_practice_time_secs: u64,
    pub inherited_from_adaptive: bool,
}

impl Default for CustomProgress {
    fn default() -> Self {
        Self {
            active: false,
            timing: BreathTiming::default(),
            total_cycles: 0,
            total_sessions: 0,
            total_practice_time_secs: 0,
            inherited_from_adaptive: false,
        }
    }
}

/// Mode-independent aggregate statistics.
///
/// `total_sessions`, `total_cycles` and `total_practice_time_secs` are owned
/// by session recording alone; per-cycle increments never touch them, so a
/// physical cycle is counted at most once here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_sessions: u64,
    pub total_cycles: u64,
    pub total_practice_time_secs: u64,
    pub first_session_date: Option<DateTime<Utc>>,
    pub last_session_date: Option<DateTime<Utc>>,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub average_session_cycles: f64,
    pub preferred_mode: PracticeMode,
}

impl Default for OverallStats {
    fn default() -> Self {
        Self {
            total_sessions: 0,
            total_cycles: 0,
            total_practice_time_secs: 0,
            first_session_date: None,
            last_session_date: None,
            current_streak: 0,
            longest_streak: 0,
            average_session_cycles: 0.0,
            preferred_mode: PracticeMode::Adaptive,
        }
    }
}

/// Position in the adaptive level progression, returned by cycle increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CyclePosition {
    pub current_level: u32,
    pub current_cycle_in_level: u32,
    pub total_cycles: u64,
}

/// Descriptor for one finished level in a batch store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CompletedLevel {
    pub level_number: u32,
    pub cycles_completed: u32,
    pub timing: BreathTiming,
}

/// The per-user durable progress record.
///
/// One record per user, created lazily with these defaults: level 1, cycle 1,
/// adaptive mode enabled, everything else zeroed. All engine semantics are
/// synchronous mutations on this aggregate; persistence wraps them in a
/// single atomic write so a record can never be observed half-updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub user_id: UserId,
    pub adaptive: AdaptiveProgress,
    pub custom: CustomProgress,
    pub overall: OverallStats,
    /// Most-recent-first, bounded at [`RECENT_SESSIONS_DEPTH`].
    pub recent_sessions: Vec<SessionEntry>,
}

impl ProgressRecord {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            adaptive: AdaptiveProgress::default(),
            custom: CustomProgress::default(),
            overall: OverallStats::default(),
            recent_sessions: Vec::new(),
        }
    }

    /// Whether a session id is still present in the recent-history window.
    #[must_use]
    pub fn contains_session(&self, session_id: &SessionId) -> bool {
        self.recent_sessions
            .iter()
            .any(|entry| entry.session_id() == session_id)
    }

    /// Ingest one completed session.
    ///
    /// Applies, in order: history prepend (truncated to the retention depth),
    /// overall totals, mode-routed totals, streak advance, and the average
    /// recompute. Returns `false` without changing anything when the entry's
    /// session id is already in `recent_sessions` (duplicate resubmission
    /// within the history window).
    ///
    /// Recording a session does not flip the active-mode flags; only
    /// [`set_mode`](Self::set_mode) does.
    pub fn apply_session(&mut self, entry: SessionEntry) -> bool {
        if self.contains_session(entry.session_id()) {
            return false;
        }

        let previous_last = self.overall.last_session_date;
        let session_date = entry.end_time();

        self.overall.total_sessions += 1;
        self.overall.total_cycles += u64::from(entry.cycles_completed());
        self.overall.total_practice_time_secs += entry.practice_time_secs();
        if self.overall.first_session_date.is_none_or(|d| session_date < d) {
            self.overall.first_session_date = Some(session_date);
        }
        // An out-of-order event must not move the last-session date backwards.
        if previous_last.is_none_or(|d| session_date > d) {
            self.overall.last_session_date = Some(session_date);
        }

        match entry.mode() {
            PracticeMode::Adaptive => {
                self.adaptive.total_sessions_completed += 1;
                self.adaptive.total_cycles_completed += u64::from(entry.cycles_completed());
                self.adaptive.total_practice_time_secs += entry.practice_time_secs();
                self.adaptive.longest_session_cycles = self
                    .adaptive
                    .longest_session_cycles
                    .max(entry.cycles_completed());
                self.adaptive.last_session_timing = entry.timing();
            }
            PracticeMode::Custom => {
                self.custom.total_sessions += 1;
                self.custom.total_cycles += u64::from(entry.cycles_completed());
                self.custom.total_practice_time_secs += entry.practice_time_secs();
            }
        }

        let update = streak::advance(
            previous_last,
            session_date,
            self.overall.current_streak,
            self.overall.longest_streak,
        );
        self.overall.current_streak = update.current;
        self.overall.longest_streak = update.longest;
        self.adaptive.current_streak = update.current;
        self.adaptive.longest_streak = update.longest;

        self.overall.average_session_cycles = if self.overall.total_sessions == 0 {
            0.0
        } else {
            self.overall.total_cycles as f64 / self.overall.total_sessions as f64
        };
        self.overall.preferred_mode = if self.custom.total_sessions
            > self.adaptive.total_sessions_completed
        {
            PracticeMode::Custom
        } else {
            PracticeMode::Adaptive
        };

        self.recent_sessions.insert(0, entry);
        self.recent_sessions.truncate(RECENT_SESSIONS_DEPTH);
        true
    }

    /// Record one completed cycle. See [`increment_cycles`](Self::increment_cycles).
    pub fn increment_cycle(&mut self) -> CyclePosition {
        self.increment_cycles(1)
    }

    /// Record `count` completed cycles outside a session recording.
    ///
    /// In adaptive mode the level position rolls at [`CYCLES_PER_LEVEL`]:
    /// crossing the last cycle advances the level and resets the cycle to 1.
    /// In custom mode only `custom.total_cycles` grows. Overall totals are
    /// owned by session recording and are not touched here.
    pub fn increment_cycles(&mut self, count: u32) -> CyclePosition {
        if self.custom.active {
            self.custom.total_cycles += u64::from(count);
            return CyclePosition {
                current_level: self.adaptive.current_level,
                current_cycle_in_level: self.adaptive.current_cycle_in_level,
                total_cycles: self.custom.total_cycles,
            };
        }

        let advanced = (self.adaptive.current_cycle_in_level - 1) + count;
        self.adaptive.current_level += advanced / CYCLES_PER_LEVEL;
        self.adaptive.current_cycle_in_level = advanced % CYCLES_PER_LEVEL + 1;
        self.adaptive.total_cycles_completed += u64::from(count);

        CyclePosition {
            current_level: self.adaptive.current_level,
            current_cycle_in_level: self.adaptive.current_cycle_in_level,
            total_cycles: self.adaptive.total_cycles_completed,
        }
    }

    /// Store an ordered batch of completed levels as one synthetic session.
    ///
    /// Sums cycles and estimated practice time (`cycles × cycle_secs` per
    /// level), routes one summarizing entry through
    /// [`apply_session`](Self::apply_session) so overall totals stay owned by
    /// session recording, then jumps the level position to one past the last
    /// completed level. `badges_earned` names badges granted for the batch
    /// (already inserted into the badge set by the caller) so they appear on
    /// the history entry. Returns the stored entry, or `None` for an empty
    /// batch.
    pub fn store_completed_levels(
        &mut self,
        levels: &[CompletedLevel],
        now: DateTime<Utc>,
        badges_earned: Vec<String>,
    ) -> Option<SessionEntry> {
        let last = levels.last()?;

        let cycles: u32 = levels.iter().map(|l| l.cycles_completed).sum();
        let practice_secs: u64 = levels
            .iter()
            .map(|l| u64::from(l.cycles_completed) * u64::from(l.timing.cycle_secs()))
            .sum();

        let first_number = levels[0].level_number;
        let entry = SessionEntry::synthetic(
            SessionId::new(format!("level-batch-{}", uuid::Uuid::new_v4())),
            PracticeMode::Adaptive,
            now - chrono::Duration::seconds(i64::try_from(practice_secs).unwrap_or(0)),
            now,
            cycles,
            practice_secs,
            last.timing,
            Some(last.level_number),
            Some(format!(
                "levels {first_number}-{} completed",
                last.level_number
            )),
        )
        .with_badges_earned(badges_earned);
        self.apply_session(entry.clone());

        self.adaptive.current_level = last.level_number + 1;
        self.adaptive.current_cycle_in_level = 1;
        Some(entry)
    }

    /// Idempotently grant a badge. Returns `false` when already held.
    pub fn award_badge(&mut self, badge_name: &str) -> bool {
        self.adaptive.badges.insert(badge_name.to_owned())
    }

    /// Switch the active tracking mode. Exactly one mode is active at a time.
    ///
    /// Switching to custom freezes the current adaptive level so it can be
    /// resumed unchanged; switching back clears the freeze. Counters are
    /// never reset by a switch, only which ones future sessions feed.
    pub fn set_mode(&mut self, mode: PracticeMode) {
        match mode {
            PracticeMode::Adaptive => {
                self.adaptive.enabled = true;
                self.custom.active = false;
                self.adaptive.frozen_difficulty_level = None;
            }
            PracticeMode::Custom => {
                self.adaptive.enabled = false;
                self.custom.active = true;
                self.adaptive.frozen_difficulty_level = Some(self.adaptive.current_level);
            }
        }
    }

    /// Copy a timing triple from adaptive practice into custom settings.
    pub fn inherit_from_adaptive(&mut self, timing: BreathTiming) {
        self.custom.timing = timing;
        self.custom.inherited_from_adaptive = true;
    }

    /// Zero the adaptive block in place, preserving mode exclusivity.
    /// The record itself is never deleted.
    pub fn reset_adaptive(&mut self) {
        let enabled = self.adaptive.enabled;
        self.adaptive = AdaptiveProgress {
            enabled,
            ..AdaptiveProgress::default()
        };
    }

    /// Zero the custom block in place, preserving mode exclusivity.
    pub fn reset_custom(&mut self) {
        let active = self.custom.active;
        self.custom = CustomProgress {
            active,
            ..CustomProgress::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionDraft;
    use crate::time::fixed_now;
    use chrono::{Duration, TimeZone, Utc};

    fn record() -> ProgressRecord {
        ProgressRecord::new(UserId::new("u1"))
    }

    fn entry(id: &str, mode: PracticeMode, cycles: i64, end: DateTime<Utc>) -> SessionEntry {
        SessionDraft {
            session_id: Some(id.into()),
            mode: Some(mode),
            start_time: Some(end - Duration::minutes(5)),
            end_time: Some(end),
            cycles_completed: Some(cycles),
            practice_time_secs: Some(300),
            ..SessionDraft::default()
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn new_record_has_documented_defaults() {
        let rec = record();
        assert!(rec.adaptive.enabled);
        assert!(!rec.custom.active);
        assert_eq!(rec.adaptive.current_level, 1);
        assert_eq!(rec.adaptive.current_cycle_in_level, 1);
        assert!(rec.adaptive.badges.is_empty());
        assert_eq!(rec.overall.current_streak, 0);
        assert!(rec.recent_sessions.is_empty());
    }

    #[test]
    fn first_adaptive_session_updates_all_counters() {
        let mut rec = record();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 8, 5, 0).unwrap();
        assert!(rec.apply_session(entry("s1", PracticeMode::Adaptive, 6, end)));

        assert_eq!(rec.adaptive.total_sessions_completed, 1);
        assert_eq!(rec.overall.total_cycles, 6);
        assert_eq!(rec.overall.total_practice_time_secs, 300);
        assert!((rec.overall.average_session_cycles - 6.0).abs() < f64::EPSILON);
        assert_eq!(rec.overall.first_session_date, Some(end));
        assert_eq!(rec.overall.last_session_date, Some(end));
        assert_eq!(rec.overall.current_streak, 1);
        assert_eq!(rec.adaptive.longest_session_cycles, 6);
    }

    #[test]
    fn custom_session_feeds_custom_counters_only() {
        let mut rec = record();
        rec.apply_session(entry("s1", PracticeMode::Custom, 4, fixed_now()));

        assert_eq!(rec.custom.total_sessions, 1);
        assert_eq!(rec.custom.total_cycles, 4);
        assert_eq!(rec.adaptive.total_sessions_completed, 0);
        assert_eq!(rec.overall.total_sessions, 1);
        // Recording a custom session does not flip the mode flags.
        assert!(rec.adaptive.enabled);
        assert!(!rec.custom.active);
        assert_eq!(rec.overall.preferred_mode, PracticeMode::Custom);
    }

    #[test]
    fn duplicate_session_id_in_window_is_a_no_op() {
        let mut rec = record();
        let e = entry("dup", PracticeMode::Adaptive, 5, fixed_now());
        assert!(rec.apply_session(e.clone()));
        assert!(!rec.apply_session(e));
        assert_eq!(rec.overall.total_sessions, 1);
        assert_eq!(rec.overall.total_cycles, 5);
        assert_eq!(rec.recent_sessions.len(), 1);
    }

    #[test]
    fn session_id_evicted_from_window_applies_again() {
        let mut rec = record();
        rec.apply_session(entry("old", PracticeMode::Adaptive, 1, fixed_now()));
        for i in 0..RECENT_SESSIONS_DEPTH {
            let end = fixed_now() + Duration::minutes(i as i64 + 1);
            rec.apply_session(entry(&format!("s{i}"), PracticeMode::Adaptive, 1, end));
        }
        assert!(!rec.contains_session(&SessionId::new("old")));

        // The dedup window is the history depth; older ids re-apply.
        assert!(rec.apply_session(entry("old", PracticeMode::Adaptive, 1, fixed_now())));
        assert_eq!(rec.overall.total_sessions, 12);
    }

    #[test]
    fn recent_sessions_is_bounded_and_most_recent_first() {
        let mut rec = record();
        for i in 0..15 {
            let end = fixed_now() + Duration::minutes(i);
            rec.apply_session(entry(&format!("s{i}"), PracticeMode::Adaptive, 1, end));
        }
        assert_eq!(rec.recent_sessions.len(), RECENT_SESSIONS_DEPTH);
        assert_eq!(rec.recent_sessions[0].session_id().as_str(), "s14");
        assert_eq!(rec.recent_sessions[9].session_id().as_str(), "s5");
    }

    #[test]
    fn six_increments_roll_one_level() {
        let mut rec = record();
        let mut pos = rec.increment_cycle();
        for _ in 1..6 {
            pos = rec.increment_cycle();
        }
        assert_eq!(pos.current_level, 2);
        assert_eq!(pos.current_cycle_in_level, 1);

        let pos = rec.increment_cycle();
        assert_eq!(pos.current_level, 2);
        assert_eq!(pos.current_cycle_in_level, 2);
    }

    #[test]
    fn batch_increment_matches_repeated_single_increments() {
        let mut batched = record();
        let pos = batched.increment_cycles(13);
        assert_eq!(pos.current_level, 3);
        assert_eq!(pos.current_cycle_in_level, 2);
        assert_eq!(pos.total_cycles, 13);

        let mut stepped = record();
        for _ in 0..13 {
            stepped.increment_cycle();
        }
        assert_eq!(stepped.adaptive.current_level, 3);
        assert_eq!(stepped.adaptive.current_cycle_in_level, 2);

        let mut twelve = record();
        let pos = twelve.increment_cycles(12);
        assert_eq!((pos.current_level, pos.current_cycle_in_level), (3, 1));
    }

    #[test]
    fn cycle_increments_never_touch_overall_totals() {
        let mut rec = record();
        rec.increment_cycles(20);
        assert_eq!(rec.overall.total_cycles, 0);
        assert_eq!(rec.adaptive.total_cycles_completed, 20);
    }

    #[test]
    fn custom_mode_increment_feeds_custom_total_only() {
        let mut rec = record();
        rec.set_mode(PracticeMode::Custom);
        let pos = rec.increment_cycles(3);
        assert_eq!(pos.total_cycles, 3);
        assert_eq!(rec.custom.total_cycles, 3);
        assert_eq!(rec.adaptive.total_cycles_completed, 0);
        assert_eq!(rec.adaptive.current_cycle_in_level, 1);
    }

    #[test]
    fn badge_award_is_idempotent() {
        let mut rec = record();
        assert!(rec.award_badge("level-5-master"));
        assert!(!rec.award_badge("level-5-master"));
        assert_eq!(rec.adaptive.badges.len(), 1);
    }

    #[test]
    fn mode_switch_is_exclusive_and_freezes_level() {
        let mut rec = record();
        rec.adaptive.current_level = 4;

        rec.set_mode(PracticeMode::Custom);
        assert!(!rec.adaptive.enabled);
        assert!(rec.custom.active);
        assert_eq!(rec.adaptive.frozen_difficulty_level, Some(4));

        rec.set_mode(PracticeMode::Adaptive);
        assert!(rec.adaptive.enabled);
        assert!(!rec.custom.active);
        assert_eq!(rec.adaptive.frozen_difficulty_level, None);
        assert_eq!(rec.adaptive.current_level, 4);
    }

    #[test]
    fn inherited_timing_is_copied_and_flagged() {
        let mut rec = record();
        rec.set_mode(PracticeMode::Custom);
        rec.inherit_from_adaptive(BreathTiming::new(5, 5, 5));
        assert_eq!(rec.custom.timing, BreathTiming::new(5, 5, 5));
        assert!(rec.custom.inherited_from_adaptive);
        assert!(!rec.adaptive.enabled);
    }

    #[test]
    fn store_completed_levels_sums_and_jumps_position() {
        let mut rec = record();
        let timing = BreathTiming::new(4, 4, 4);
        let levels = vec![
            CompletedLevel {
                level_number: 1,
                cycles_completed: 6,
                timing,
            },
            CompletedLevel {
                level_number: 2,
                cycles_completed: 6,
                timing,
            },
        ];
        let entry = rec
            .store_completed_levels(&levels, fixed_now(), Vec::new())
            .unwrap();

        assert_eq!(entry.cycles_completed(), 12);
        assert_eq!(entry.practice_time_secs(), 12 * 12);
        assert_eq!(entry.level_number(), Some(2));
        assert_eq!(rec.adaptive.current_level, 3);
        assert_eq!(rec.adaptive.current_cycle_in_level, 1);
        assert_eq!(rec.overall.total_cycles, 12);
        assert_eq!(rec.overall.total_sessions, 1);
        assert_eq!(rec.recent_sessions.len(), 1);
    }

    #[test]
    fn empty_level_batch_is_a_no_op() {
        let mut rec = record();
        assert!(
            rec.store_completed_levels(&[], fixed_now(), Vec::new())
                .is_none()
        );
        assert_eq!(rec, record());
    }

    #[test]
    fn resets_zero_in_place_but_keep_mode_flags() {
        let mut rec = record();
        rec.set_mode(PracticeMode::Custom);
        rec.apply_session(entry("s1", PracticeMode::Custom, 4, fixed_now()));
        rec.award_badge("starter");

        rec.reset_custom();
        assert_eq!(rec.custom.total_sessions, 0);
        assert!(rec.custom.active);

        rec.reset_adaptive();
        assert!(rec.adaptive.badges.is_empty());
        assert!(!rec.adaptive.enabled);
        assert_eq!(rec.adaptive.current_level, 1);
    }

    #[test]
    fn totals_equal_sum_of_recordings_across_modes() {
        let mut rec = record();
        let cycles = [6_i64, 4, 8];
        for (i, c) in cycles.iter().enumerate() {
            let mode = if i % 2 == 0 {
                PracticeMode::Adaptive
            } else {
                PracticeMode::Custom
            };
            let end = fixed_now() + Duration::minutes(i as i64);
            rec.apply_session(entry(&format!("s{i}"), mode, *c, end));
        }
        // Independent per-cycle calls must not leak into overall totals.
        rec.increment_cycles(5);

        assert_eq!(rec.overall.total_cycles, 18);
        assert_eq!(rec.overall.total_sessions, 3);
        assert_eq!(
            rec.overall.total_cycles,
            rec.adaptive.total_cycles_completed + rec.custom.total_cycles - 5
        );
    }
}
