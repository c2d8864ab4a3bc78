use std::collections::HashSet;

use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

use crate::domain::entities::{NewTrackedRow, TrackedEntity};
use crate::domain::value_objects::{ContentHash, EntityKind, NaturalKey};
use crate::shared::error::Result;

/// The tracking store: one row per natural key per entity kind. Upserts
/// touch source state only; sync state is owned by `update_sync_state`.
#[derive(Clone)]
pub struct TrackingRepository {
    pool: Pool<Sqlite>,
}

#[derive(sqlx::FromRow)]
struct TrackedRowRecord {
    natural_key: String,
    secondary_key: String,
    remote_id: Option<String>,
    payload: String,
    source_hash: String,
    last_synced_hash: Option<String>,
    position: Option<i64>,
    last_seen_at: i64,
    last_synced_at: Option<i64>,
    created_at: i64,
}

impl TrackedRowRecord {
    fn into_entity(self, kind: EntityKind) -> Result<TrackedEntity> {
        Ok(TrackedEntity {
            kind,
            key: NaturalKey::from_columns(self.natural_key, self.secondary_key),
            remote_id: self.remote_id,
            payload: serde_json::from_str(&self.payload)?,
            source_hash: ContentHash::from_hex(self.source_hash),
            last_synced_hash: self.last_synced_hash.map(ContentHash::from_hex),
            position: self.position,
            last_seen_at: self.last_seen_at,
            last_synced_at: self.last_synced_at,
            created_at: self.created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "natural_key, secondary_key, remote_id, payload, source_hash, \
     last_synced_hash, position, last_seen_at, last_synced_at, created_at";

impl TrackingRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Insert-or-refresh by natural key, one transaction for the whole
    /// batch. On conflict only payload, source_hash, position and
    /// last_seen_at change; remote_id and last_synced_hash are sync state
    /// and stay untouched.
    pub async fn upsert_many(&self, kind: EntityKind, rows: &[NewTrackedRow]) -> Result<()> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO tracked_entities (
                    entity_kind, natural_key, secondary_key, payload,
                    source_hash, position, last_seen_at, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                ON CONFLICT (entity_kind, natural_key, secondary_key)
                DO UPDATE SET
                    payload = excluded.payload,
                    source_hash = excluded.source_hash,
                    position = excluded.position,
                    last_seen_at = excluded.last_seen_at
                "#,
            )
            .bind(kind.as_str())
            .bind(row.key.primary())
            .bind(row.key.secondary_column())
            .bind(serde_json::to_string(&row.payload)?)
            .bind(row.source_hash.as_str())
            .bind(row.position)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Rows with a pending change: never synced, hash drift, or everything
    /// when forced.
    pub async fn needing_sync(&self, kind: EntityKind, force: bool) -> Result<Vec<TrackedEntity>> {
        let records = sqlx::query_as::<_, TrackedRowRecord>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM tracked_entities
            WHERE entity_kind = ?1
              AND (?2 OR last_synced_hash IS NULL OR last_synced_hash != source_hash)
            ORDER BY natural_key, secondary_key
            "#
        ))
        .bind(kind.as_str())
        .bind(force)
        .fetch_all(&self.pool)
        .await?;

        records
            .into_iter()
            .map(|record| record.into_entity(kind))
            .collect()
    }

    pub async fn all_for_kind(&self, kind: EntityKind) -> Result<Vec<TrackedEntity>> {
        let records = sqlx::query_as::<_, TrackedRowRecord>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM tracked_entities
            WHERE entity_kind = ?1
            ORDER BY natural_key, secondary_key
            "#
        ))
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        records
            .into_iter()
            .map(|record| record.into_entity(kind))
            .collect()
    }

    /// Orphan candidates: tracked rows whose key is absent from the current
    /// snapshot's key set. An empty key set returns every row; callers gate
    /// that path deliberately.
    pub async fn not_in_key_set(
        &self,
        kind: EntityKind,
        current_keys: &HashSet<NaturalKey>,
    ) -> Result<Vec<TrackedEntity>> {
        let rows = self.all_for_kind(kind).await?;
        Ok(rows
            .into_iter()
            .filter(|row| !current_keys.contains(&row.key))
            .collect())
    }

    /// Sets sync state atomically. `None`/`None` resets the row after a
    /// remote 404, which is what makes self-heal possible.
    pub async fn update_sync_state(
        &self,
        kind: EntityKind,
        key: &NaturalKey,
        hash: Option<&ContentHash>,
        remote_id: Option<&str>,
    ) -> Result<()> {
        let synced_at = hash.map(|_| Utc::now().timestamp());
        sqlx::query(
            r#"
            UPDATE tracked_entities
            SET last_synced_hash = ?1, last_synced_at = ?2, remote_id = ?3
            WHERE entity_kind = ?4 AND natural_key = ?5 AND secondary_key = ?6
            "#,
        )
        .bind(hash.map(|h| h.as_str()))
        .bind(synced_at)
        .bind(remote_id)
        .bind(kind.as_str())
        .bind(key.primary())
        .bind(key.secondary_column())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, kind: EntityKind, key: &NaturalKey) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM tracked_entities
            WHERE entity_kind = ?1 AND natural_key = ?2 AND secondary_key = ?3
            "#,
        )
        .bind(kind.as_str())
        .bind(key.primary())
        .bind(key.secondary_column())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, kind: EntityKind, key: &NaturalKey) -> Result<Option<TrackedEntity>> {
        let record = sqlx::query_as::<_, TrackedRowRecord>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM tracked_entities
            WHERE entity_kind = ?1 AND natural_key = ?2 AND secondary_key = ?3
            "#
        ))
        .bind(kind.as_str())
        .bind(key.primary())
        .bind(key.secondary_column())
        .fetch_optional(&self.pool)
        .await?;

        record.map(|r| r.into_entity(kind)).transpose()
    }

    /// Every remote id known to the store for this kind; the untracked
    /// remote pass deletes anything the target holds beyond this set.
    pub async fn remote_ids(&self, kind: EntityKind) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            r#"
            SELECT remote_id FROM tracked_entities
            WHERE entity_kind = ?1 AND remote_id IS NOT NULL
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.try_get::<String, _>("remote_id").ok())
            .collect())
    }

    pub async fn count(&self, kind: EntityKind) -> Result<usize> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count FROM tracked_entities WHERE entity_kind = ?1
            "#,
        )
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as usize)
    }

}
