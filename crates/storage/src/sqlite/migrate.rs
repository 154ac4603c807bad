use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Applies every pending schema version inside its own transaction.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: item bank, sessions, learner profiles.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS placement_items (
                    id INTEGER PRIMARY KEY,
                    skill TEXT NOT NULL,
                    band INTEGER NOT NULL CHECK (band BETWEEN 1 AND 6),
                    irt_a REAL NOT NULL CHECK (irt_a > 0),
                    irt_b REAL NOT NULL CHECK (irt_b BETWEEN -3 AND 3),
                    irt_c REAL NOT NULL CHECK (irt_c >= 0 AND irt_c < 1),
                    options TEXT NOT NULL,
                    correct_key TEXT NOT NULL,
                    times_shown INTEGER NOT NULL DEFAULT 0 CHECK (times_shown >= 0),
                    times_correct INTEGER NOT NULL DEFAULT 0
                        CHECK (times_correct >= 0 AND times_correct <= times_shown),
                    is_active INTEGER NOT NULL DEFAULT 1
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS placement_sessions (
                    id TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    version INTEGER NOT NULL CHECK (version >= 0),
                    state TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    completed_at TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS learner_profiles (
                    user_id INTEGER PRIMARY KEY,
                    profile TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS applied_results (
                    session_id TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    applied_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_placement_items_skill_active
                    ON placement_items (skill, is_active, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_placement_sessions_user_status
                    ON placement_sessions (user_id, status);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
