//! Per-table repositories. Each owns its own queries against the
//! `COLUMNS` constants in [`crate::models`] so no query here ever
//! `SELECT *`s a row it doesn't fully consume.

use crate::models::{
    ApplicationRow, InventoryAlertRow, InventoryDiffRow, InventoryRecordRow, SystemRow,
};
use chrono::{DateTime, Utc};
use invpipe_core::error::{Error, Result};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Reads/writes on the subset of `systems` columns this pipeline owns.
#[derive(Clone)]
pub struct SystemRepository {
    pool: PgPool,
}

impl SystemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get<'e, E>(&self, executor: E, system_id: Uuid) -> Result<Option<SystemRow>>
    where
        E: PgExecutor<'e>,
    {
        let row = sqlx::query_as::<_, SystemRow>(&format!(
            "SELECT {} FROM systems WHERE id = $1",
            SystemRow::COLUMNS
        ))
        .bind(system_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| Error::database_with_source("failed to fetch system", e))?;

        Ok(row)
    }

    /// Updates the fields this pipeline derives from inventory payloads
    /// (spec §4.3.1): name, fqdn, version, type, ipv4_address. A system row
    /// is created out-of-band (not by this pipeline), so this never inserts,
    /// and a soft-deleted system is never touched or resurrected.
    ///
    /// Takes a generic executor so it can run inside the caller's
    /// transaction (spec §4.3 step 5, §7 — the whole per-job write set
    /// commits or rolls back together).
    pub async fn upsert_derived_fields<'e, E>(
        &self,
        executor: E,
        system_id: Uuid,
        name: Option<&str>,
        fqdn: Option<&str>,
        version: Option<&str>,
        product_type: Option<&str>,
        ipv4_address: Option<&str>,
    ) -> Result<()>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE systems SET
                name = COALESCE($2, name),
                fqdn = COALESCE($3, fqdn),
                version = COALESCE($4, version),
                type = COALESCE($5, type),
                ipv4_address = COALESCE($6, ipv4_address),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(system_id)
        .bind(name)
        .bind(fqdn)
        .bind(version)
        .bind(product_type)
        .bind(ipv4_address)
        .execute(executor)
        .await
        .map_err(|e| Error::database_with_source("failed to update system fields", e))?;

        Ok(())
    }
}

/// Reads/writes on `inventory_records`.
#[derive(Clone)]
pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new snapshot, or touches the existing one. `data_hash` is
    /// the SHA-256 of the raw payload bytes (spec §4.3); the unique
    /// constraint on `(system_id, data_hash)` is the deduplication gate —
    /// re-ingesting an identical payload always returns the same id rather
    /// than creating a new row, so a replayed message can be processed
    /// idempotently downstream (spec §8).
    pub async fn insert<'e, E>(
        &self,
        executor: E,
        system_id: Uuid,
        timestamp: DateTime<Utc>,
        data: serde_json::Value,
        data_hash: &str,
        data_size: i64,
    ) -> Result<i64>
    where
        E: PgExecutor<'e>,
    {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO inventory_records (system_id, timestamp, data, data_hash, data_size)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (system_id, data_hash) DO UPDATE SET
                timestamp = EXCLUDED.timestamp,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(system_id)
        .bind(timestamp)
        .bind(&data)
        .bind(data_hash)
        .bind(data_size)
        .fetch_one(executor)
        .await
        .map_err(|e| Error::database_with_source("failed to insert inventory record", e))?;

        Ok(id)
    }

    /// Predecessor snapshot for a system, ordered by event time rather than
    /// insertion order so concurrent diff-worker replicas processing
    /// out-of-order records still diff against the right prior snapshot
    /// (spec §5). Not filtered to already-processed rows: a record racing
    /// this one through the pipeline is still a valid predecessor once it
    /// exists, and excluding it would silently skip or misorder diffs.
    pub async fn latest_processed_before(
        &self,
        system_id: Uuid,
        before_id: i64,
    ) -> Result<Option<InventoryRecordRow>> {
        let row = sqlx::query_as::<_, InventoryRecordRow>(&format!(
            r#"
            SELECT {} FROM inventory_records
            WHERE system_id = $1 AND id < $2
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
            InventoryRecordRow::COLUMNS
        ))
        .bind(system_id)
        .bind(before_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to fetch predecessor record", e))?;

        Ok(row)
    }

    pub async fn get(&self, id: i64) -> Result<Option<InventoryRecordRow>> {
        let row = sqlx::query_as::<_, InventoryRecordRow>(&format!(
            "SELECT {} FROM inventory_records WHERE id = $1",
            InventoryRecordRow::COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to fetch inventory record", e))?;

        Ok(row)
    }

    pub async fn mark_processed(&self, id: i64, has_changes: bool, change_count: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE inventory_records
            SET processed_at = NOW(), has_changes = $2, change_count = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(has_changes)
        .bind(change_count)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to mark record processed", e))?;

        Ok(())
    }

    /// Deletes records older than `max_age_cutoff` EXCEPT the most recent
    /// `retention` per system (floor of 5) — both conditions must hold, so a
    /// system with sparse traffic keeps its last 5 snapshots indefinitely
    /// and a noisy system still loses only what's both old and beyond rank
    /// (spec §4.7).
    pub async fn delete_beyond_retention(
        &self,
        retention: i64,
        max_age_cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let retention = retention.max(5);
        let result = sqlx::query(
            r#"
            DELETE FROM inventory_records
            WHERE id IN (
                SELECT id FROM (
                    SELECT id, timestamp, ROW_NUMBER() OVER (
                        PARTITION BY system_id ORDER BY id DESC
                    ) AS rank
                    FROM inventory_records
                ) ranked
                WHERE rank > $1 AND timestamp < $2
            )
            "#,
        )
        .bind(retention)
        .bind(max_age_cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to prune inventory records", e))?;

        Ok(result.rows_affected())
    }
}

/// Reads/writes on `inventory_diffs`.
#[derive(Clone)]
pub struct DiffRepository {
    pool: PgPool,
}

impl DiffRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_batch(&self, diffs: &[NewDiff]) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(diffs.len());
        for diff in diffs {
            let (id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO inventory_diffs
                    (system_id, previous_id, current_id, diff_type, field_path,
                     previous_value, current_value, severity, category)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id
                "#,
            )
            .bind(diff.system_id)
            .bind(diff.previous_id)
            .bind(diff.current_id)
            .bind(&diff.diff_type)
            .bind(&diff.field_path)
            .bind(&diff.previous_value)
            .bind(&diff.current_value)
            .bind(&diff.severity)
            .bind(&diff.category)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::database_with_source("failed to insert inventory diff", e))?;
            ids.push(id);
        }
        Ok(ids)
    }

    pub async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<InventoryDiffRow>> {
        let rows = sqlx::query_as::<_, InventoryDiffRow>(&format!(
            "SELECT {} FROM inventory_diffs WHERE id = ANY($1)",
            InventoryDiffRow::COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to fetch diffs by id", e))?;

        Ok(rows)
    }

    pub async fn unsent(&self, limit: i64) -> Result<Vec<InventoryDiffRow>> {
        let rows = sqlx::query_as::<_, InventoryDiffRow>(&format!(
            r#"
            SELECT {} FROM inventory_diffs
            WHERE notification_sent = FALSE
            ORDER BY created_at ASC
            LIMIT $1
            "#,
            InventoryDiffRow::COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to list unsent diffs", e))?;

        Ok(rows)
    }

    pub async fn mark_sent(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE inventory_diffs SET notification_sent = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database_with_source("failed to mark diff sent", e))?;
        Ok(())
    }

    /// Deletes diffs older than `before` whose severity is in `severities`
    /// (spec §4.7: low/medium diffs prune sooner than high/critical ones).
    pub async fn delete_older_than(
        &self,
        before: DateTime<Utc>,
        severities: &[&str],
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM inventory_diffs WHERE created_at < $1 AND severity = ANY($2)",
        )
        .bind(before)
        .bind(severities)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to prune inventory diffs", e))?;

        Ok(result.rows_affected())
    }
}

/// A single field-level diff pending insertion, produced by the diff engine.
#[derive(Debug, Clone)]
pub struct NewDiff {
    pub system_id: Uuid,
    pub previous_id: Option<i64>,
    pub current_id: i64,
    pub diff_type: String,
    pub field_path: String,
    pub previous_value: Option<serde_json::Value>,
    pub current_value: Option<serde_json::Value>,
    pub severity: String,
    pub category: String,
}

/// Reads/writes on `applications`.
#[derive(Clone)]
pub struct ApplicationRepository {
    pool: PgPool,
}

impl ApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts by `(system_id, module_id)`, refreshing `last_inventory_at`
    /// and un-deleting an application that reappears (spec §4.3.2).
    pub async fn upsert<'e, E>(&self, executor: E, app: &ApplicationRow) -> Result<()>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO applications
                (id, system_id, module_id, instance_of, display_name, node_id, node_label,
                 version, url, inventory_data, is_user_facing, status, first_seen_at,
                 last_inventory_at, deleted_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13, NULL, $13)
            ON CONFLICT (system_id, module_id) DO UPDATE SET
                instance_of = EXCLUDED.instance_of,
                display_name = EXCLUDED.display_name,
                node_id = EXCLUDED.node_id,
                node_label = EXCLUDED.node_label,
                version = EXCLUDED.version,
                url = EXCLUDED.url,
                inventory_data = EXCLUDED.inventory_data,
                is_user_facing = EXCLUDED.is_user_facing,
                last_inventory_at = EXCLUDED.last_inventory_at,
                deleted_at = NULL,
                updated_at = EXCLUDED.last_inventory_at
            "#,
        )
        .bind(&app.id)
        .bind(app.system_id)
        .bind(&app.module_id)
        .bind(&app.instance_of)
        .bind(&app.display_name)
        .bind(app.node_id)
        .bind(&app.node_label)
        .bind(&app.version)
        .bind(&app.url)
        .bind(&app.inventory_data)
        .bind(app.is_user_facing)
        .bind(&app.status)
        .bind(app.last_inventory_at)
        .execute(executor)
        .await
        .map_err(|e| Error::database_with_source("failed to upsert application", e))?;

        Ok(())
    }

    pub async fn list_active_for_system(&self, system_id: Uuid) -> Result<Vec<ApplicationRow>> {
        let rows = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {} FROM applications WHERE system_id = $1 AND deleted_at IS NULL",
            ApplicationRow::COLUMNS
        ))
        .bind(system_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to list applications", e))?;

        Ok(rows)
    }

    /// Soft-deletes applications for a system not present in `seen_module_ids`,
    /// i.e. applications that disappeared from the latest inventory (spec §4.3.2).
    pub async fn soft_delete_missing<'e, E>(
        &self,
        executor: E,
        system_id: Uuid,
        seen_module_ids: &[String],
    ) -> Result<u64>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE system_id = $1 AND deleted_at IS NULL AND NOT (module_id = ANY($2))
            "#,
        )
        .bind(system_id)
        .bind(seen_module_ids)
        .execute(executor)
        .await
        .map_err(|e| Error::database_with_source("failed to soft-delete applications", e))?;

        Ok(result.rows_affected())
    }
}

/// Reads/writes on `inventory_alerts`.
#[derive(Clone)]
pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, alert: &InventoryAlertRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_alerts
                (id, system_id, alert_type, message, severity, is_resolved, resolved_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(alert.id)
        .bind(alert.system_id)
        .bind(&alert.alert_type)
        .bind(&alert.message)
        .bind(&alert.severity)
        .bind(alert.is_resolved)
        .bind(alert.resolved_at)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to insert alert", e))?;

        Ok(())
    }

    pub async fn resolve(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE inventory_alerts SET is_resolved = TRUE, resolved_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::database_with_source("failed to resolve alert", e))?;
        Ok(())
    }

    /// Deletes resolved alerts older than `older_than` (spec §4.7, 30-day rule).
    pub async fn delete_resolved_older_than(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM inventory_alerts WHERE is_resolved = TRUE AND resolved_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to prune resolved alerts", e))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_diff_carries_severity_and_category_as_text() {
        let diff = NewDiff {
            system_id: Uuid::nil(),
            previous_id: Some(1),
            current_id: 2,
            diff_type: "modified".into(),
            field_path: "applications.mail.version".into(),
            previous_value: Some(serde_json::json!("1.0")),
            current_value: Some(serde_json::json!("2.0")),
            severity: "medium".into(),
            category: "application".into(),
        };
        assert_eq!(diff.diff_type, "modified");
        assert_eq!(diff.severity, "medium");
    }
}
