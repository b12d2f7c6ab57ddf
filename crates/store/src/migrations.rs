//! Versioned, additive schema migrations.
//!
//! Each migration is a batch of DDL statements applied inside one
//! transaction; the `schema_version` table records what has been applied.
//! Migrations only ever add tables, columns, and indexes.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::StoreError;

/// One schema migration: a version, a short name, and the statements to run.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

/// A row from the `schema_version` ledger.
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// The ordered migration list. Append-only; never edit an applied entry.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_link_tables",
        statements: &[
            "CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                source TEXT NOT NULL,
                title TEXT,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                last_checked TEXT,
                status TEXT,
                status_code INTEGER,
                response_time_ms INTEGER,
                archived INTEGER NOT NULL DEFAULT 0,
                archive_url TEXT,
                archive_date TEXT,
                trust_tier TEXT,
                archive_attempts INTEGER NOT NULL DEFAULT 0,
                next_retry_after TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS archive_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                link_id INTEGER NOT NULL REFERENCES links(id),
                service TEXT NOT NULL,
                status TEXT NOT NULL,
                snapshot_url TEXT,
                archive_date TEXT,
                attempts INTEGER NOT NULL DEFAULT 1,
                next_retry_after TEXT,
                error_message TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )",
        ],
    },
    Migration {
        version: 2,
        name: "create_library_tables",
        statements: &[
            "CREATE TABLE IF NOT EXISTS books (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                publication_year INTEGER,
                isbn TEXT,
                dewey_decimal TEXT,
                cutter_number TEXT,
                call_number TEXT,
                reading_status TEXT,
                enriched_at TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS papers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                first_author TEXT,
                year INTEGER,
                doi TEXT UNIQUE,
                udc_number TEXT,
                call_number TEXT,
                reading_status TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )",
        ],
    },
    Migration {
        version: 3,
        name: "create_auth_tables",
        statements: &[
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_user_id INTEGER NOT NULL UNIQUE,
                telegram_username TEXT,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_login_at TEXT
            )",
            "CREATE TABLE IF NOT EXISTS auth_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                token TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                used_at TEXT,
                ip_address TEXT,
                user_agent TEXT
            )",
            "CREATE TABLE IF NOT EXISTS api_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                token TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_used_at TEXT,
                revoked_at TEXT
            )",
            "CREATE TABLE IF NOT EXISTS daemon_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        ],
    },
    Migration {
        version: 4,
        name: "add_link_indexes",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_links_trust_tier ON links(trust_tier)",
            "CREATE INDEX IF NOT EXISTS idx_links_source ON links(source)",
            "CREATE INDEX IF NOT EXISTS idx_links_last_checked ON links(last_checked)",
            "CREATE INDEX IF NOT EXISTS idx_snapshots_link_service
                ON archive_snapshots(link_id, service)",
            "CREATE INDEX IF NOT EXISTS idx_snapshots_retry
                ON archive_snapshots(status, next_retry_after)",
        ],
    },
    Migration {
        version: 5,
        name: "add_library_indexes",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_books_dewey ON books(dewey_decimal)",
            "CREATE INDEX IF NOT EXISTS idx_books_year ON books(publication_year)",
            "CREATE INDEX IF NOT EXISTS idx_papers_year ON papers(year)",
        ],
    },
];

/// Apply all pending migrations. Called once on store open.
pub async fn apply_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let current: Option<i64> = sqlx::query("SELECT MAX(version) AS v FROM schema_version")
        .fetch_one(pool)
        .await?
        .try_get("v")?;
    let current = current.unwrap_or(0);
    debug!(version = current, "current schema version");

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        debug!("schema is up to date");
        return Ok(());
    }

    for migration in pending {
        info!(
            version = migration.version,
            name = migration.name,
            "applying migration"
        );
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_version (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

/// List applied migrations in version order.
pub async fn migration_history(pool: &SqlitePool) -> Result<Vec<MigrationRecord>, StoreError> {
    let rows = sqlx::query(
        "SELECT version, name, applied_at FROM schema_version ORDER BY version ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(MigrationRecord {
                version: row.try_get("version")?,
                name: row.try_get("name")?,
                applied_at: row.try_get("applied_at")?,
            })
        })
        .collect()
}
