//! SQLite connection factory, migration runner, and the `db` core module.

use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use shelf_kernel::settings::DatabaseSettings;
use shelf_kernel::{InitCtx, Migration, Module};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

const MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _shelf_migrations (
        module     TEXT NOT NULL,
        id         TEXT NOT NULL,
        applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (module, id)
    );
"#;

/// Handle to the relational store. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open a pool for the configured URL, creating the database file if needed.
    pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&settings.url)
            .with_context(|| format!("invalid database url '{}'", settings.url))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` is a separate database, so pin the pool
        // to a single connection that never expires.
        let pool_options = if settings.url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(settings.max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to '{}'", settings.url))?;

        tracing::info!(target: "shelf-db", url = %settings.url, "database pool ready");

        Ok(Self { pool })
    }

    /// Private in-memory database, used by tests and one-off tooling.
    pub async fn connect_in_memory() -> anyhow::Result<Self> {
        Self::connect(&DatabaseSettings {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply every migration that has not run yet, each in its own transaction.
    /// Returns how many were applied.
    pub async fn apply_migrations(&self, migrations: &[(String, Migration)]) -> anyhow::Result<usize> {
        sqlx::raw_sql(MIGRATIONS_TABLE)
            .execute(&self.pool)
            .await
            .context("failed to create migrations table")?;

        let mut applied = 0;
        for (module, migration) in migrations {
            let already_applied: Option<String> =
                sqlx::query_scalar("SELECT id FROM _shelf_migrations WHERE module = ? AND id = ?")
                    .bind(module)
                    .bind(migration.id)
                    .fetch_optional(&self.pool)
                    .await
                    .context("failed to read migrations table")?;

            if already_applied.is_some() {
                tracing::debug!(target: "shelf-db", %module, id = migration.id, "migration already applied");
                continue;
            }

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(migration.up)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("migration {}/{} failed", module, migration.id))?;
            sqlx::query("INSERT INTO _shelf_migrations (module, id) VALUES (?, ?)")
                .bind(module)
                .bind(migration.id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!(target: "shelf-db", %module, id = migration.id, "migration applied");
            applied += 1;
        }

        Ok(applied)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Core module owning the pool lifecycle: verifies connectivity on init and
/// closes the pool on stop.
pub struct DbModule {
    database: Database,
}

impl DbModule {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl Module for DbModule {
    fn name(&self) -> &'static str {
        "db"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.database.pool())
            .await
            .context("database ping failed")?;
        tracing::info!(module = self.name(), "db module initialized");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.database.close().await;
        tracing::info!(module = self.name(), "db module stopped");
        Ok(())
    }
}
