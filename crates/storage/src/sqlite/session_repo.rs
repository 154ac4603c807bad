use placement_core::model::{Session, SessionId, SessionStatus, UserId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{id_i64, ser};
use crate::repository::{SessionRepository, StorageError};

fn version_i64(session: &Session) -> Result<i64, StorageError> {
    id_i64("version", session.version())
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(&self, session: &Session) -> Result<(), StorageError> {
        let state = serde_json::to_string(session).map_err(ser)?;

        let result = sqlx::query(
            r"
            INSERT INTO placement_sessions (
                id, user_id, status, version, state, started_at, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(session.id().to_string())
        .bind(id_i64("user_id", session.user_id().value())?)
        .bind(session.status().as_str())
        .bind(version_i64(session)?)
        .bind(state)
        .bind(session.started_at())
        .bind(session.completed_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn load_session(&self, id: SessionId) -> Result<Session, StorageError> {
        let row = sqlx::query("SELECT state FROM placement_sessions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;

        let state: String = row.try_get("state").map_err(ser)?;
        serde_json::from_str(&state).map_err(ser)
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let state = serde_json::to_string(session).map_err(ser)?;
        let expected = version_i64(session)? - 1;

        let result = sqlx::query(
            r"
            UPDATE placement_sessions
            SET status = ?2,
                version = ?3,
                state = ?4,
                completed_at = ?5
            WHERE id = ?1 AND version = ?6
            ",
        )
        .bind(session.id().to_string())
        .bind(session.status().as_str())
        .bind(version_i64(session)?)
        .bind(state)
        .bind(session.completed_at())
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM placement_sessions WHERE id = ?1")
            .bind(session.id().to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        match exists {
            Some(_) => Err(StorageError::Conflict),
            None => Err(StorageError::NotFound),
        }
    }

    async fn find_in_progress(&self, user_id: UserId) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT state FROM placement_sessions
            WHERE user_id = ?1 AND status = ?2
            ORDER BY started_at DESC
            LIMIT 1
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(SessionStatus::InProgress.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let state: String = row.try_get("state").map_err(ser)?;
        serde_json::from_str(&state).map(Some).map_err(ser)
    }
}
