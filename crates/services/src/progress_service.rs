use std::sync::Arc;

use breath_core::Clock;
use breath_core::config::CONFLICT_RETRY_LIMIT;
use breath_core::model::{
    BreathTiming, CompletedLevel, CyclePosition, PracticeMode, ProgressRecord, SessionDraft,
    SessionEntry, UserId,
};
use storage::repository::{
    LeaderboardRanking, LeaderboardRow, ProgressRepository, StorageError,
};
use tracing::{debug, error};

use crate::badge_catalog::{BadgeMetadataSource, LevelBadge};
use crate::error::ProgressError;
use crate::views::{BadgeGrant, StatisticsView};

/// Orchestrates all progress operations around the record store.
///
/// Every mutating operation is one read-modify-write of the user's record:
/// load (creating on first access), apply the pure mutation from
/// `breath_core`, and persist the whole record in a single version-guarded
/// write. A version conflict means another request for the same user won the
/// race; the full sequence is retried once and then surfaced.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    records: Arc<dyn ProgressRepository>,
    badges: Arc<dyn BadgeMetadataSource>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        records: Arc<dyn ProgressRepository>,
        badges: Arc<dyn BadgeMetadataSource>,
    ) -> Self {
        Self {
            clock,
            records,
            badges,
        }
    }

    /// Fetch the user's record, creating it with defaults on first access.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the store is unavailable.
    pub async fn get_progress(&self, user_id: &UserId) -> Result<ProgressRecord, ProgressError> {
        let loaded = self
            .records
            .get_or_create(user_id)
            .await
            .map_err(|e| self.storage_failure(user_id, "get_progress", e))?;
        Ok(loaded.record)
    }

    /// Validate and ingest one completed session, returning the updated
    /// record.
    ///
    /// A resubmitted `session_id` still present in the recent-history window
    /// is a no-op returning the current record. Adaptive sessions carrying a
    /// level or set number consult the badge metadata source and grant any
    /// badge not already held, recording it on the history entry.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Validation` before any mutation if the
    /// payload is invalid, or `ProgressError::Storage` on store failure.
    pub async fn record_session(
        &self,
        user_id: &UserId,
        draft: SessionDraft,
    ) -> Result<ProgressRecord, ProgressError> {
        let entry = draft.validate()?;
        let candidates = self.badge_candidates(&entry);

        let (_, record) = self
            .mutate(user_id, "record_session", |record| {
                if record.contains_session(entry.session_id()) {
                    return false;
                }
                let mut earned = Vec::new();
                for badge in &candidates {
                    if record.award_badge(&badge.badge_name) {
                        earned.push(badge.badge_name.clone());
                    }
                }
                record.apply_session(entry.clone().with_badges_earned(earned))
            })
            .await?;
        Ok(record)
    }

    /// Record one completed cycle outside a session recording.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` on store failure.
    pub async fn increment_cycle(&self, user_id: &UserId) -> Result<CyclePosition, ProgressError> {
        self.increment_cycles(user_id, 1).await
    }

    /// Record `count` completed cycles outside a session recording.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` on store failure.
    pub async fn increment_cycles(
        &self,
        user_id: &UserId,
        count: u32,
    ) -> Result<CyclePosition, ProgressError> {
        let (position, _) = self
            .mutate(user_id, "increment_cycles", |record| {
                record.increment_cycles(count)
            })
            .await?;
        Ok(position)
    }

    /// Store an ordered batch of completed levels as one synthetic session,
    /// granting badges for every level and set in the batch that has
    /// metadata.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` on store failure.
    pub async fn store_completed_levels(
        &self,
        user_id: &UserId,
        levels: Vec<CompletedLevel>,
    ) -> Result<ProgressRecord, ProgressError> {
        let now = self.clock.now();
        let candidates: Vec<LevelBadge> = levels
            .iter()
            .filter_map(|level| self.badges.badge_for_level(level.level_number))
            .collect();

        let (_, record) = self
            .mutate(user_id, "store_completed_levels", |record| {
                let mut earned = Vec::new();
                for badge in &candidates {
                    if record.award_badge(&badge.badge_name) {
                        earned.push(badge.badge_name.clone());
                    }
                }
                record.store_completed_levels(&levels, now, earned)
            })
            .await?;
        Ok(record)
    }

    /// Idempotently grant a named badge.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` on store failure.
    pub async fn award_badge(
        &self,
        user_id: &UserId,
        badge_name: &str,
    ) -> Result<BadgeGrant, ProgressError> {
        let (granted, record) = self
            .mutate(user_id, "award_badge", |record| {
                record.award_badge(badge_name)
            })
            .await?;
        Ok(BadgeGrant {
            granted,
            total_badges: record.adaptive.badges.len(),
        })
    }

    /// Switch the active tracking mode.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` on store failure.
    pub async fn set_mode(
        &self,
        user_id: &UserId,
        mode: PracticeMode,
    ) -> Result<ProgressRecord, ProgressError> {
        let (_, record) = self
            .mutate(user_id, "set_mode", |record| record.set_mode(mode))
            .await?;
        Ok(record)
    }

    /// Copy a timing triple from adaptive practice into custom settings.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` on store failure.
    pub async fn inherit_timing(
        &self,
        user_id: &UserId,
        timing: BreathTiming,
    ) -> Result<ProgressRecord, ProgressError> {
        let (_, record) = self
            .mutate(user_id, "inherit_timing", |record| {
                record.inherit_from_adaptive(timing);
            })
            .await?;
        Ok(record)
    }

    /// Zero the adaptive block. Returns `false` (success, nothing to do)
    /// when the user has no record; resets never create one.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` on store failure.
    pub async fn reset_adaptive(&self, user_id: &UserId) -> Result<bool, ProgressError> {
        self.mutate_existing(user_id, "reset_adaptive", ProgressRecord::reset_adaptive)
            .await
    }

    /// Zero the custom block. Same no-record semantics as
    /// [`reset_adaptive`](Self::reset_adaptive).
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` on store failure.
    pub async fn reset_custom(&self, user_id: &UserId) -> Result<bool, ProgressError> {
        self.mutate_existing(user_id, "reset_custom", ProgressRecord::reset_custom)
            .await
    }

    /// Aggregate statistics view over the user's record.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the store is unavailable.
    pub async fn get_statistics(&self, user_id: &UserId) -> Result<StatisticsView, ProgressError> {
        let record = self.get_progress(user_id).await?;
        Ok(StatisticsView::from_record(record))
    }

    /// Top users by total sessions or current streak.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the query fails.
    pub async fn get_leaderboard(
        &self,
        ranking: LeaderboardRanking,
        limit: u32,
    ) -> Result<Vec<LeaderboardRow>, ProgressError> {
        self.records
            .leaderboard(ranking, limit)
            .await
            .map_err(|e| {
                error!(operation = "get_leaderboard", error = %e, "progress operation failed");
                ProgressError::Storage(e)
            })
    }

    fn badge_candidates(&self, entry: &SessionEntry) -> Vec<LevelBadge> {
        if entry.mode() != PracticeMode::Adaptive {
            return Vec::new();
        }
        let mut candidates = Vec::new();
        if let Some(level) = entry.level_number() {
            candidates.extend(self.badges.badge_for_level(level));
        }
        if let Some(set) = entry.set_number() {
            candidates.extend(self.badges.badge_for_set(set));
        }
        candidates
    }

    /// One read-modify-write of the user's record, creating it on first
    /// access, retried once on version conflict.
    async fn mutate<T>(
        &self,
        user_id: &UserId,
        operation: &'static str,
        mut apply: impl FnMut(&mut ProgressRecord) -> T,
    ) -> Result<(T, ProgressRecord), ProgressError> {
        for attempt in 0..=CONFLICT_RETRY_LIMIT {
            let loaded = self
                .records
                .get_or_create(user_id)
                .await
                .map_err(|e| self.storage_failure(user_id, operation, e))?;

            let mut record = loaded.record;
            let out = apply(&mut record);

            match self.records.update(user_id, loaded.version, &record).await {
                Ok(_) => return Ok((out, record)),
                Err(StorageError::Conflict) if attempt < CONFLICT_RETRY_LIMIT => {
                    debug!(user = %user_id, operation, "version conflict, retrying");
                }
                Err(e) => return Err(self.storage_failure(user_id, operation, e)),
            }
        }
        unreachable!("conflict retry loop always returns")
    }

    /// Like [`mutate`](Self::mutate) but without auto-creation: a missing
    /// record is a successful no-op (`false`).
    async fn mutate_existing(
        &self,
        user_id: &UserId,
        operation: &'static str,
        apply: impl Fn(&mut ProgressRecord),
    ) -> Result<bool, ProgressError> {
        for attempt in 0..=CONFLICT_RETRY_LIMIT {
            let loaded = match self.records.get(user_id).await {
                Ok(loaded) => loaded,
                Err(StorageError::NotFound) => return Ok(false),
                Err(e) => return Err(self.storage_failure(user_id, operation, e)),
            };

            let mut record = loaded.record;
            apply(&mut record);

            match self.records.update(user_id, loaded.version, &record).await {
                Ok(_) => return Ok(true),
                Err(StorageError::Conflict) if attempt < CONFLICT_RETRY_LIMIT => {
                    debug!(user = %user_id, operation, "version conflict, retrying");
                }
                Err(e) => return Err(self.storage_failure(user_id, operation, e)),
            }
        }
        unreachable!("conflict retry loop always returns")
    }

    fn storage_failure(
        &self,
        user_id: &UserId,
        operation: &'static str,
        e: StorageError,
    ) -> ProgressError {
        error!(user = %user_id, operation, error = %e, "progress operation failed");
        ProgressError::Storage(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge_catalog::{NoBadges, StaticBadgeCatalog};
    use breath_core::time::{fixed_clock, fixed_now};
    use chrono::{DateTime, Duration, Utc};
    use storage::repository::InMemoryRepository;

    fn service_with(badges: Arc<dyn BadgeMetadataSource>) -> ProgressService {
        ProgressService::new(fixed_clock(), Arc::new(InMemoryRepository::new()), badges)
    }

    fn service() -> ProgressService {
        service_with(Arc::new(NoBadges))
    }

    fn draft(id: &str, mode: PracticeMode, cycles: i64, end: DateTime<Utc>) -> SessionDraft {
        SessionDraft {
            session_id: Some(id.into()),
            mode: Some(mode),
            start_time: Some(end - Duration::minutes(5)),
            end_time: Some(end),
            cycles_completed: Some(cycles),
            practice_time_secs: Some(300),
            ..SessionDraft::default()
        }
    }

    #[tokio::test]
    async fn get_progress_creates_record_lazily() {
        let svc = service();
        let user = UserId::new("u1");
        let record = svc.get_progress(&user).await.unwrap();
        assert_eq!(record.adaptive.current_level, 1);
        assert!(record.adaptive.enabled);
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_without_mutation() {
        let svc = service();
        let user = UserId::new("u1");
        let mut bad = draft("s1", PracticeMode::Adaptive, 6, fixed_now());
        bad.cycles_completed = Some(-3);

        let err = svc.record_session(&user, bad).await.unwrap_err();
        assert!(matches!(err, ProgressError::Validation(_)));

        let record = svc.get_progress(&user).await.unwrap();
        assert_eq!(record.overall.total_sessions, 0);
    }

    #[tokio::test]
    async fn session_with_level_metadata_grants_badge_once() {
        let catalog = StaticBadgeCatalog::new()
            .with_level_badge(1, LevelBadge::new("first-level", "Level one complete"));
        let svc = service_with(Arc::new(catalog));
        let user = UserId::new("u1");

        let mut d = draft("s1", PracticeMode::Adaptive, 6, fixed_now());
        d.level_number = Some(1);
        let record = svc.record_session(&user, d).await.unwrap();
        assert!(record.adaptive.badges.contains("first-level"));
        assert_eq!(
            record.recent_sessions[0].badges_earned(),
            ["first-level".to_owned()]
        );

        // Same level again: badge already held, nothing earned.
        let mut d = draft("s2", PracticeMode::Adaptive, 6, fixed_now());
        d.level_number = Some(1);
        let record = svc.record_session(&user, d).await.unwrap();
        assert_eq!(record.adaptive.badges.len(), 1);
        assert!(record.recent_sessions[0].badges_earned().is_empty());
    }

    #[tokio::test]
    async fn duplicate_session_resubmission_is_a_no_op() {
        let svc = service();
        let user = UserId::new("u1");
        let d = draft("s1", PracticeMode::Adaptive, 6, fixed_now());

        svc.record_session(&user, d.clone()).await.unwrap();
        let record = svc.record_session(&user, d).await.unwrap();
        assert_eq!(record.overall.total_sessions, 1);
        assert_eq!(record.overall.total_cycles, 6);
    }

    #[tokio::test]
    async fn award_badge_reports_grant_and_total() {
        let svc = service();
        let user = UserId::new("u1");

        let first = svc.award_badge(&user, "zen-master").await.unwrap();
        assert!(first.granted);
        assert_eq!(first.total_badges, 1);

        let second = svc.award_badge(&user, "zen-master").await.unwrap();
        assert!(!second.granted);
        assert_eq!(second.total_badges, 1);
    }

    #[tokio::test]
    async fn reset_without_record_is_a_no_op_success() {
        let svc = service();
        let user = UserId::new("never-seen");
        assert!(!svc.reset_adaptive(&user).await.unwrap());
        assert!(!svc.reset_custom(&user).await.unwrap());

        // Resets must not create a record as a side effect.
        let err = svc.records.get(&user).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }
}
