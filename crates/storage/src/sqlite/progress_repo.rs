use breath_core::model::{ProgressRecord, UserId};
use chrono::Utc;
use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{
    LeaderboardRanking, LeaderboardRow, ProgressRepository, StorageError, VersionedRecord,
};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn map_versioned_row(row: &sqlx::sqlite::SqliteRow) -> Result<VersionedRecord, StorageError> {
    let version: i64 = row.try_get("version").map_err(ser)?;
    let json: String = row.try_get("record").map_err(ser)?;
    let record: ProgressRecord = serde_json::from_str(&json).map_err(ser)?;
    Ok(VersionedRecord { version, record })
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_or_create(&self, user_id: &UserId) -> Result<VersionedRecord, StorageError> {
        let fresh = ProgressRecord::new(user_id.clone());
        let json = serde_json::to_string(&fresh).map_err(ser)?;
        let now = Utc::now();

        // Atomic find-or-insert: the conflict clause makes concurrent first
        // requests for a brand-new user converge on a single row.
        sqlx::query(
            r"
                INSERT INTO progress_records (user_id, version, record, created_at, updated_at)
                VALUES (?1, 1, ?2, ?3, ?3)
                ON CONFLICT (user_id) DO NOTHING
            ",
        )
        .bind(user_id.as_str())
        .bind(&json)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(conn)?;

        self.get(user_id).await
    }

    async fn get(&self, user_id: &UserId) -> Result<VersionedRecord, StorageError> {
        let row = sqlx::query(
            r"
                SELECT version, record
                FROM progress_records
                WHERE user_id = ?1
            ",
        )
        .bind(user_id.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_versioned_row(&row)
    }

    async fn update(
        &self,
        user_id: &UserId,
        expected_version: i64,
        record: &ProgressRecord,
    ) -> Result<i64, StorageError> {
        let json = serde_json::to_string(record).map_err(ser)?;

        let res = sqlx::query(
            r"
                UPDATE progress_records
                SET record = ?1, version = version + 1, updated_at = ?2
                WHERE user_id = ?3 AND version = ?4
            ",
        )
        .bind(&json)
        .bind(Utc::now())
        .bind(user_id.as_str())
        .bind(expected_version)
        .execute(self.pool())
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            // Either the row vanished or another writer bumped the version.
            return match self.get(user_id).await {
                Ok(_) => Err(StorageError::Conflict),
                Err(StorageError::NotFound) => Err(StorageError::NotFound),
                Err(e) => Err(e),
            };
        }
        Ok(expected_version + 1)
    }

    async fn leaderboard(
        &self,
        ranking: LeaderboardRanking,
        limit: u32,
    ) -> Result<Vec<LeaderboardRow>, StorageError> {
        let order_expr = match ranking {
            LeaderboardRanking::TotalSessions => "json_extract(record, '$.overall.total_sessions')",
            LeaderboardRanking::CurrentStreak => "json_extract(record, '$.overall.current_streak')",
        };
        let sql = format!(
            r"
                SELECT
                    user_id,
                    json_extract(record, '$.overall.total_sessions') AS total_sessions,
                    json_extract(record, '$.overall.current_streak') AS current_streak
                FROM progress_records
                ORDER BY {order_expr} DESC
                LIMIT ?1
            "
        );

        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(conn)?;

        rows.iter()
            .map(|row| {
                let user_id: String = row.try_get("user_id").map_err(ser)?;
                let total_sessions: i64 = row.try_get("total_sessions").map_err(ser)?;
                let current_streak: i64 = row.try_get("current_streak").map_err(ser)?;
                Ok(LeaderboardRow {
                    user_id: UserId::new(user_id),
                    total_sessions: u64::try_from(total_sessions)
                        .map_err(|_| ser("negative total_sessions"))?,
                    current_streak: u32::try_from(current_streak)
                        .map_err(|_| ser("negative current_streak"))?,
                })
            })
            .collect()
    }
}
