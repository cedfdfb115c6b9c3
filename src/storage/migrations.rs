//! Versioned schema migrations.
//!
//! Each [`Migration`] groups the statements of one schema step. Applied steps
//! are recorded by name in `_migrations`; a step and its record commit in the
//! same transaction, so a failed step leaves nothing behind and is retried on
//! the next run.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};

use super::schema;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration '{name}' failed: {source}")]
    MigrationFailed {
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// One schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

/// Every schema step, in application order. Never reorder or rename entries.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_owners",
        statements: &[schema::CREATE_OWNERS_TABLE],
    },
    Migration {
        name: "0002_containers",
        statements: &[schema::CREATE_CONTAINERS_TABLE],
    },
    Migration {
        name: "0003_container_indexes",
        statements: &[
            schema::CREATE_HOST_PORT_INDEX,
            schema::CREATE_OWNER_INDEX,
            schema::CREATE_OWNER_STATUS_INDEX,
        ],
    },
];

const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    name VARCHAR(255) PRIMARY KEY,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// A recorded schema step.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Applies [`MIGRATIONS`] against a pool.
pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies pending steps and returns how many ran.
    pub async fn run_migrations(&self) -> Result<usize, MigrationError> {
        sqlx::query(CREATE_MIGRATIONS_TABLE)
            .execute(&self.pool)
            .await?;

        let done: Vec<String> = self
            .applied()
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect();

        let mut count = 0;
        for migration in pending(MIGRATIONS, &done) {
            self.apply(migration).await?;
            info!(migration = migration.name, "Applied migration");
            count += 1;
        }

        if count == 0 {
            debug!("Schema is up to date");
        }
        Ok(count)
    }

    /// Steps recorded so far, oldest first.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        sqlx::query(CREATE_MIGRATIONS_TABLE)
            .execute(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, AppliedMigration>(
            "SELECT name, applied_at FROM _migrations ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let failed = |source| MigrationError::MigrationFailed {
            name: migration.name,
            source,
        };

        let mut tx = self.pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(failed)?;
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES ($1)")
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Steps of `all` not yet in `done`, in order.
fn pending<'a>(all: &'a [Migration], done: &[String]) -> Vec<&'a Migration> {
    all.iter()
        .filter(|m| !done.iter().any(|name| name == m.name))
        .collect()
}
