use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::domain::entities::PendingFieldChange;
use crate::domain::value_objects::PortalPage;
use crate::shared::error::{AppError, Result};

/// Reverse-sync state: locally edited member fields waiting to flow back to
/// the portal, and the last value pushed per field (with its provenance
/// timestamp).
#[derive(Clone)]
pub struct PortalStateRepository {
    pool: Pool<Sqlite>,
}

#[derive(sqlx::FromRow)]
struct FieldRow {
    member_key: String,
    page: String,
    field: String,
    value: String,
}

impl PortalStateRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Records a downstream edit destined for the portal. Overwrites any
    /// earlier unsynced edit of the same field.
    pub async fn record_edit(
        &self,
        member_key: &str,
        page: PortalPage,
        field: &str,
        value: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO member_field_edits (member_key, page, field, value, edited_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (member_key, page, field)
            DO UPDATE SET value = excluded.value, edited_at = excluded.edited_at
            "#,
        )
        .bind(member_key)
        .bind(page.as_str())
        .bind(field)
        .bind(value)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn edits(&self) -> Result<Vec<PendingFieldChange>> {
        let rows = sqlx::query_as::<_, FieldRow>(
            r#"
            SELECT member_key, page, field, value
            FROM member_field_edits
            ORDER BY member_key, page, field
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_change).collect()
    }

    /// Last pushed value per (page, field) for one member.
    pub async fn pushed_values(
        &self,
        member_key: &str,
    ) -> Result<HashMap<(PortalPage, String), String>> {
        let rows = sqlx::query_as::<_, FieldRow>(
            r#"
            SELECT member_key, page, field, value
            FROM portal_field_state
            WHERE member_key = ?1
            "#,
        )
        .bind(member_key)
        .fetch_all(&self.pool)
        .await?;

        let mut map = HashMap::new();
        for row in rows {
            let page = parse_page(&row.page)?;
            map.insert((page, row.field), row.value);
        }
        Ok(map)
    }

    /// Commits a fully verified member push in one transaction: the pushed
    /// values become the new field state (pushed_at doubling as provenance),
    /// the consumed edits disappear, and the tracked member row's
    /// last_seen_at is refreshed so a parallel forward sync does not read
    /// the just-written values as new source drift.
    pub async fn mark_synced(
        &self,
        member_key: &str,
        changes: &[PendingFieldChange],
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for change in changes {
            sqlx::query(
                r#"
                INSERT INTO portal_field_state (member_key, page, field, value, pushed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT (member_key, page, field)
                DO UPDATE SET value = excluded.value, pushed_at = excluded.pushed_at
                "#,
            )
            .bind(member_key)
            .bind(change.page.as_str())
            .bind(&change.field)
            .bind(&change.new_value)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                DELETE FROM member_field_edits
                WHERE member_key = ?1 AND page = ?2 AND field = ?3
                "#,
            )
            .bind(member_key)
            .bind(change.page.as_str())
            .bind(&change.field)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            r#"
            UPDATE tracked_entities
            SET last_seen_at = ?1
            WHERE entity_kind = 'member' AND natural_key = ?2
            "#,
        )
        .bind(now)
        .bind(member_key)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn row_to_change(row: FieldRow) -> Result<PendingFieldChange> {
    let page = parse_page(&row.page)?;
    Ok(PendingFieldChange {
        member_key: row.member_key,
        page,
        field: row.field,
        new_value: row.value,
    })
}

fn parse_page(value: &str) -> Result<PortalPage> {
    PortalPage::parse(value)
        .ok_or_else(|| AppError::Serialization(format!("unknown portal page: {value}")))
}
