//! Database migration system.

use invpipe_core::error::{Error, Result};
use sqlx::PgPool;

/// Migration entry.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// Applies pending migrations in order, tracked in a `_migrations` table.
pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    pub fn new() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }

    pub fn add(&mut self, migration: Migration) -> &mut Self {
        self.migrations.push(migration);
        self.migrations.sort_by_key(|m| m.version);
        self
    }

    pub fn with_migrations(mut self, migrations: Vec<Migration>) -> Self {
        for m in migrations {
            self.add(m);
        }
        self
    }

    pub async fn run(&self, pool: &PgPool) -> Result<Vec<i64>> {
        self.ensure_migrations_table(pool).await?;
        let applied = self.get_applied_migrations(pool).await?;

        let mut newly_applied = Vec::new();
        for migration in &self.migrations {
            if !applied.contains(&migration.version) {
                self.apply_migration(pool, migration).await?;
                newly_applied.push(migration.version);
            }
        }

        if newly_applied.is_empty() {
            tracing::info!("no pending migrations");
        } else {
            tracing::info!(count = newly_applied.len(), "applied migrations");
        }

        Ok(newly_applied)
    }

    pub async fn status(&self, pool: &PgPool) -> Result<Vec<MigrationStatus>> {
        self.ensure_migrations_table(pool).await?;
        let applied = self.get_applied_migrations(pool).await?;

        Ok(self
            .migrations
            .iter()
            .map(|m| MigrationStatus {
                version: m.version,
                name: m.name.clone(),
                applied: applied.contains(&m.version),
            })
            .collect())
    }

    async fn ensure_migrations_table(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| Error::database_with_source("failed to create migrations table", e))?;

        Ok(())
    }

    async fn get_applied_migrations(&self, pool: &PgPool) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT version FROM _migrations ORDER BY version")
            .fetch_all(pool)
            .await
            .map_err(|e| Error::database_with_source("failed to list applied migrations", e))?;

        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    async fn apply_migration(&self, pool: &PgPool, migration: &Migration) -> Result<()> {
        tracing::info!(version = migration.version, name = %migration.name, "applying migration");

        sqlx::query(&migration.sql)
            .execute(pool)
            .await
            .map_err(|e| Error::database_with_source(format!("migration {} failed", migration.version), e))?;

        sqlx::query("INSERT INTO _migrations (version, name) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(&migration.name)
            .execute(pool)
            .await
            .map_err(|e| Error::database_with_source("failed to record migration", e))?;

        Ok(())
    }
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Migration status, for the operator surface / `migrate --status` CLI.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub version: i64,
    pub name: String,
    pub applied: bool,
}

/// The pipeline's own schema. `systems` here is the minimal writable subset
/// from spec §3 (id/name/fqdn/version/type/ipv4_address/deleted_at/updated_at);
/// the broader backend's `systems` table carries additional tenant/account
/// columns this pipeline never touches and this migration does not own.
pub fn create_initial_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "create_systems_table",
            r#"
            CREATE TABLE IF NOT EXISTS systems (
                id UUID PRIMARY KEY,
                name VARCHAR(255),
                fqdn VARCHAR(255),
                version VARCHAR(100),
                type VARCHAR(50),
                ipv4_address VARCHAR(45),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ
            );

            CREATE INDEX IF NOT EXISTS idx_systems_deleted_at ON systems(deleted_at);
            "#,
        ),
        Migration::new(
            2,
            "create_inventory_records_table",
            r#"
            CREATE TABLE IF NOT EXISTS inventory_records (
                id BIGSERIAL PRIMARY KEY,
                system_id UUID NOT NULL REFERENCES systems(id),
                timestamp TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL,
                data_hash VARCHAR(64) NOT NULL,
                data_size BIGINT NOT NULL,
                processed_at TIMESTAMPTZ,
                has_changes BOOLEAN NOT NULL DEFAULT FALSE,
                change_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT uq_inventory_records_system_hash UNIQUE (system_id, data_hash)
            );

            CREATE INDEX IF NOT EXISTS idx_inventory_records_system_order
                ON inventory_records(system_id, timestamp DESC, id DESC);
            CREATE INDEX IF NOT EXISTS idx_inventory_records_unprocessed
                ON inventory_records(system_id) WHERE processed_at IS NULL;
            "#,
        ),
        Migration::new(
            3,
            "create_inventory_diffs_table",
            r#"
            CREATE TABLE IF NOT EXISTS inventory_diffs (
                id BIGSERIAL PRIMARY KEY,
                system_id UUID NOT NULL REFERENCES systems(id),
                previous_id BIGINT REFERENCES inventory_records(id),
                current_id BIGINT NOT NULL REFERENCES inventory_records(id),
                diff_type VARCHAR(10) NOT NULL,
                field_path TEXT NOT NULL,
                previous_value JSONB,
                current_value JSONB,
                severity VARCHAR(10) NOT NULL,
                category VARCHAR(20) NOT NULL,
                notification_sent BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_inventory_diffs_current ON inventory_diffs(current_id);
            CREATE INDEX IF NOT EXISTS idx_inventory_diffs_unsent
                ON inventory_diffs(system_id) WHERE notification_sent = FALSE;
            CREATE INDEX IF NOT EXISTS idx_inventory_diffs_severity_created
                ON inventory_diffs(severity, created_at);
            "#,
        ),
        Migration::new(
            4,
            "create_applications_table",
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id VARCHAR(310) PRIMARY KEY,
                system_id UUID NOT NULL REFERENCES systems(id),
                module_id VARCHAR(255) NOT NULL,
                instance_of VARCHAR(100) NOT NULL,
                display_name VARCHAR(255),
                node_id INTEGER,
                node_label VARCHAR(255),
                version VARCHAR(100),
                url TEXT,
                inventory_data JSONB NOT NULL DEFAULT '{}',
                is_user_facing BOOLEAN NOT NULL DEFAULT FALSE,
                status VARCHAR(50) NOT NULL DEFAULT 'unassigned',
                first_seen_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_inventory_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT uq_applications_system_module UNIQUE (system_id, module_id)
            );

            CREATE INDEX IF NOT EXISTS idx_applications_system_active
                ON applications(system_id) WHERE deleted_at IS NULL;
            "#,
        ),
        Migration::new(
            5,
            "create_inventory_alerts_table",
            r#"
            CREATE TABLE IF NOT EXISTS inventory_alerts (
                id UUID PRIMARY KEY,
                system_id UUID REFERENCES systems(id),
                alert_type VARCHAR(100) NOT NULL,
                message TEXT NOT NULL,
                severity VARCHAR(10) NOT NULL,
                is_resolved BOOLEAN NOT NULL DEFAULT FALSE,
                resolved_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_inventory_alerts_resolved
                ON inventory_alerts(is_resolved, resolved_at);
            "#,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_sorted_on_add() {
        let mut migrator = Migrator::new();
        migrator.add(Migration::new(2, "second", "SELECT 1"));
        migrator.add(Migration::new(1, "first", "SELECT 1"));
        assert_eq!(migrator.migrations[0].version, 1);
        assert_eq!(migrator.migrations[1].version, 2);
    }

    #[test]
    fn test_initial_migrations_cover_all_five_tables() {
        let migrations = create_initial_migrations();
        assert_eq!(migrations.len(), 5);
        let names: Vec<_> = migrations.iter().map(|m| m.name.as_str()).collect();
        assert!(names.contains(&"create_systems_table"));
        assert!(names.contains(&"create_inventory_records_table"));
        assert!(names.contains(&"create_inventory_diffs_table"));
        assert!(names.contains(&"create_applications_table"));
        assert!(names.contains(&"create_inventory_alerts_table"));
    }
}
