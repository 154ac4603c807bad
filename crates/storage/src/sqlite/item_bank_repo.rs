use std::collections::HashSet;

use placement_core::model::{Item, ItemId, SkillCategory};

use super::SqliteRepository;
use super::mapping::{id_i64, map_item_row, options_to_text};
use crate::repository::{ItemBank, StorageError, UsageRecorder};

const ITEM_COLUMNS: &str = r"
    id, skill, band, irt_a, irt_b, irt_c, options, correct_key,
    times_shown, times_correct, is_active
";

/// Builds a candidate query with one positional placeholder per excluded id.
///
/// Bind order is skill (when filtered), then the excluded ids, then the limit.
fn candidate_sql(skill_filter: bool, excluded: usize) -> String {
    let mut sql = format!("SELECT {ITEM_COLUMNS} FROM placement_items WHERE is_active = 1");
    let mut next = 1;
    if skill_filter {
        sql.push_str(" AND skill = ?1");
        next += 1;
    }
    if excluded > 0 {
        sql.push_str(" AND id NOT IN (");
        for i in 0..excluded {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(next + i).to_string());
        }
        sql.push(')');
        next += excluded;
    }
    sql.push_str(" ORDER BY id LIMIT ?");
    sql.push_str(&next.to_string());
    sql
}

impl SqliteRepository {
    async fn fetch_candidates(
        &self,
        skill: Option<SkillCategory>,
        excluded: &HashSet<ItemId>,
        limit: usize,
    ) -> Result<Vec<Item>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut excluded_ids = Vec::with_capacity(excluded.len());
        for id in excluded {
            excluded_ids.push(id_i64("item_id", id.value())?);
        }
        excluded_ids.sort_unstable();

        let sql = candidate_sql(skill.is_some(), excluded_ids.len());
        let mut q = sqlx::query(&sql);
        if let Some(skill) = skill {
            q = q.bind(skill.code());
        }
        for id in excluded_ids {
            q = q.bind(id);
        }
        q = q.bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_item_row).collect()
    }
}

#[async_trait::async_trait]
impl ItemBank for SqliteRepository {
    async fn fetch_active_unanswered(
        &self,
        skill: SkillCategory,
        excluded: &HashSet<ItemId>,
        limit: usize,
    ) -> Result<Vec<Item>, StorageError> {
        self.fetch_candidates(Some(skill), excluded, limit).await
    }

    async fn fetch_any_active_unanswered(
        &self,
        excluded: &HashSet<ItemId>,
        limit: usize,
    ) -> Result<Vec<Item>, StorageError> {
        self.fetch_candidates(None, excluded, limit).await
    }

    async fn get_item(&self, id: ItemId) -> Result<Item, StorageError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM placement_items WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("item_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;
        map_item_row(&row)
    }

    async fn upsert_item(&self, item: &Item) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO placement_items (
                id, skill, band, irt_a, irt_b, irt_c, options, correct_key,
                times_shown, times_correct, is_active
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                skill = excluded.skill,
                band = excluded.band,
                irt_a = excluded.irt_a,
                irt_b = excluded.irt_b,
                irt_c = excluded.irt_c,
                options = excluded.options,
                correct_key = excluded.correct_key,
                times_shown = excluded.times_shown,
                times_correct = excluded.times_correct,
                is_active = excluded.is_active
            ",
        )
        .bind(id_i64("item_id", item.id().value())?)
        .bind(item.skill().code())
        .bind(i64::from(item.band().value()))
        .bind(item.params().a())
        .bind(item.params().b())
        .bind(item.params().c())
        .bind(options_to_text(item.options()))
        .bind(item.correct_key().to_string())
        .bind(id_i64("times_shown", item.times_shown())?)
        .bind(id_i64("times_correct", item.times_correct())?)
        .bind(item.is_active())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl UsageRecorder for SqliteRepository {
    async fn record_administration(
        &self,
        item_id: ItemId,
        was_correct: bool,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            UPDATE placement_items
            SET times_shown = times_shown + 1,
                times_correct = times_correct + ?2
            WHERE id = ?1
            ",
        )
        .bind(id_i64("item_id", item_id.value())?)
        .bind(i64::from(was_correct))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }
}
