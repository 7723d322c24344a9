use async_trait::async_trait;
use breath_core::model::{ProgressRecord, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A versioned write lost the race against a concurrent writer.
    #[error("version conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A progress record together with its optimistic-concurrency version.
///
/// Every write must present the version it read; a mismatch means another
/// writer got there first and the caller should re-read and re-apply.
#[derive(Debug, Clone)]
pub struct VersionedRecord {
    pub version: i64,
    pub record: ProgressRecord,
}

/// How the leaderboard orders users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardRanking {
    TotalSessions,
    CurrentStreak,
}

/// One leaderboard row, already ordered by the requested ranking.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LeaderboardRow {
    pub user_id: UserId,
    pub total_sessions: u64,
    pub current_streak: u32,
}

/// Repository contract for per-user progress records.
///
/// Records are exclusively owned per user; the store only has to serialize
/// writers touching the *same* record, which the versioned `update` does.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the record for `user_id`, creating it with defaults on first
    /// access.
    ///
    /// Creation is an atomic find-or-insert: two near-simultaneous first
    /// requests for a brand-new user must yield one record, not two.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be loaded or created.
    async fn get_or_create(&self, user_id: &UserId) -> Result<VersionedRecord, StorageError>;

    /// Fetch the record for `user_id` without creating it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user has no record yet.
    async fn get(&self, user_id: &UserId) -> Result<VersionedRecord, StorageError>;

    /// Replace the record in a single atomic write guarded by
    /// `expected_version`. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the stored version no longer
    /// matches `expected_version`.
    async fn update(
        &self,
        user_id: &UserId,
        expected_version: i64,
        record: &ProgressRecord,
    ) -> Result<i64, StorageError>;

    /// Top users by the requested ranking.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn leaderboard(
        &self,
        ranking: LeaderboardRanking,
        limit: u32,
    ) -> Result<Vec<LeaderboardRow>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    records: Arc<Mutex<HashMap<UserId, VersionedRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_or_create(&self, user_id: &UserId) -> Result<VersionedRecord, StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let versioned = guard.entry(user_id.clone()).or_insert_with(|| VersionedRecord {
            version: 1,
            record: ProgressRecord::new(user_id.clone()),
        });
        Ok(versioned.clone())
    }

    async fn get(&self, user_id: &UserId) -> Result<VersionedRecord, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(user_id).cloned().ok_or(StorageError::NotFound)
    }

    async fn update(
        &self,
        user_id: &UserId,
        expected_version: i64,
        record: &ProgressRecord,
    ) -> Result<i64, StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let stored = guard.get_mut(user_id).ok_or(StorageError::NotFound)?;
        if stored.version != expected_version {
            return Err(StorageError::Conflict);
        }
        stored.version += 1;
        stored.record = record.clone();
        Ok(stored.version)
    }

    async fn leaderboard(
        &self,
        ranking: LeaderboardRanking,
        limit: u32,
    ) -> Result<Vec<LeaderboardRow>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut rows: Vec<LeaderboardRow> = guard
            .values()
            .map(|v| LeaderboardRow {
                user_id: v.record.user_id.clone(),
                total_sessions: v.record.overall.total_sessions,
                current_streak: v.record.overall.current_streak,
            })
            .collect();
        match ranking {
            LeaderboardRanking::TotalSessions => {
                rows.sort_by(|a, b| b.total_sessions.cmp(&a.total_sessions));
            }
            LeaderboardRanking::CurrentStreak => {
                rows.sort_by(|a, b| b.current_streak.cmp(&a.current_streak));
            }
        }
        rows.truncate(limit as usize);
        Ok(rows)
    }
}
