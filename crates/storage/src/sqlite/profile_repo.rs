use chrono::{DateTime, Utc};
use placement_core::model::{LearnerProfile, PlacementResult, SessionId, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{id_i64, ser};
use crate::repository::{LearnerProfileSink, StorageError};

fn decode_profile(raw: &str) -> Result<LearnerProfile, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

#[async_trait::async_trait]
impl LearnerProfileSink for SqliteRepository {
    async fn apply_test_result(
        &self,
        user_id: UserId,
        session_id: SessionId,
        result: &PlacementResult,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let user = id_i64("user_id", user_id.value())?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let marker = sqlx::query(
            r"
            INSERT INTO applied_results (session_id, user_id, applied_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(session_id) DO NOTHING
            ",
        )
        .bind(session_id.to_string())
        .bind(user)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if marker.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            return Ok(false);
        }

        let existing = sqlx::query("SELECT profile FROM learner_profiles WHERE user_id = ?1")
            .bind(user)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut profile = match existing {
            Some(row) => decode_profile(&row.try_get::<String, _>("profile").map_err(ser)?)?,
            None => LearnerProfile::new(user_id),
        };
        profile.apply_result(result, at);

        sqlx::query(
            r"
            INSERT INTO learner_profiles (user_id, profile, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                profile = excluded.profile,
                updated_at = excluded.updated_at
            ",
        )
        .bind(user)
        .bind(serde_json::to_string(&profile).map_err(ser)?)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(true)
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<LearnerProfile>, StorageError> {
        let row = sqlx::query("SELECT profile FROM learner_profiles WHERE user_id = ?1")
            .bind(id_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|r| decode_profile(&r.try_get::<String, _>("profile").map_err(ser)?))
            .transpose()
    }
}
