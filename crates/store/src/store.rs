//! The daemon's only durable state: a single embedded SQLite database behind
//! typed operations. Callers never see raw transactions; SQL errors are
//! surfaced as-is.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use holocene_core::{
    ApiToken, ArchiveService, ArchiveSnapshot, Book, Link, LinkStatus, Paper, ReadingStatus,
    SnapshotStatus, TrustTier, User,
};
use holocene_core::{canonicalize_url, normalize_doi, retry_delay};
use holocene_core::link::LinkHealthStats;

use crate::error::StoreError;
use crate::migrations::{self, MigrationRecord};

/// Result of an idempotent insert: the row id and whether it was created by
/// this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: i64,
    pub was_new: bool,
}

/// Handle to the embedded store. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `path`, enable WAL and
    /// foreign keys, and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        migrations::apply_migrations(&pool).await?;
        info!(path = %path.display(), "store opened");
        Ok(Self { pool })
    }

    /// Open a private in-memory database. Used by tests and one-shot tooling.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .foreign_keys(true);

        // One connection: each sqlite in-memory database is per-connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        migrations::apply_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Close the pool. Idempotent.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("store closed");
    }

    pub async fn migration_history(&self) -> Result<Vec<MigrationRecord>, StoreError> {
        migrations::migration_history(&self.pool).await
    }

    /// Cheap connectivity probe for health endpoints.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Link operations.
impl Store {
    /// Insert a link, canonicalizing the URL first. A second insert of the
    /// same canonical URL refreshes `last_seen` and returns the existing id.
    pub async fn upsert_link(
        &self,
        url: &str,
        source: &str,
        title: Option<&str>,
    ) -> Result<UpsertOutcome, StoreError> {
        let canonical = canonicalize_url(url)?;
        let now = Utc::now();

        let inserted = sqlx::query(
            "INSERT INTO links (url, source, title, first_seen, last_seen, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(url) DO NOTHING",
        )
        .bind(&canonical)
        .bind(source)
        .bind(title)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            let id = sqlx::query("SELECT id FROM links WHERE url = ?")
                .bind(&canonical)
                .fetch_one(&self.pool)
                .await?
                .try_get("id")?;
            return Ok(UpsertOutcome { id, was_new: true });
        }

        let id = sqlx::query(
            "UPDATE links
             SET last_seen = ?, title = COALESCE(title, ?)
             WHERE url = ?
             RETURNING id",
        )
        .bind(now)
        .bind(title)
        .bind(&canonical)
        .fetch_one(&self.pool)
        .await?
        .try_get("id")?;

        Ok(UpsertOutcome { id, was_new: false })
    }

    pub async fn get_link(&self, id: i64) -> Result<Option<Link>, StoreError> {
        let row = sqlx::query("SELECT * FROM links WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| link_from_row(&r)).transpose()
    }

    pub async fn get_link_by_url(&self, url: &str) -> Result<Option<Link>, StoreError> {
        let canonical = canonicalize_url(url)?;
        let row = sqlx::query("SELECT * FROM links WHERE url = ?")
            .bind(canonical)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| link_from_row(&r)).transpose()
    }

    pub async fn list_links(&self, limit: i64, offset: i64) -> Result<Vec<Link>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM links ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(link_from_row).collect()
    }

    /// Record the result of one health probe.
    pub async fn update_link_check(
        &self,
        id: i64,
        status: LinkStatus,
        status_code: Option<i64>,
        response_time_ms: Option<i64>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE links
             SET last_checked = ?, status = ?, status_code = ?, response_time_ms = ?
             WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(status.as_str())
        .bind(status_code)
        .bind(response_time_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Links due for a health check at `now`, at most `limit`.
    ///
    /// Never-checked links come first, then by trust-tier priority
    /// (pre-llm > early-llm > recent > unknown), then oldest check first.
    /// Links checked within the last `recheck_days` are skipped.
    pub async fn get_links_due_for_check(
        &self,
        limit: i64,
        recheck_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Link>, StoreError> {
        let cutoff = now - chrono::Duration::days(recheck_days);
        let rows = sqlx::query(
            "SELECT * FROM links
             WHERE last_checked IS NULL OR last_checked < ?
             ORDER BY
                 CASE WHEN last_checked IS NULL THEN 0 ELSE 1 END,
                 CASE trust_tier
                     WHEN 'pre-llm' THEN 0
                     WHEN 'early-llm' THEN 1
                     WHEN 'recent' THEN 2
                     ELSE 3 END,
                 last_checked ASC
             LIMIT ?",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(link_from_row).collect()
    }

    /// Aggregate health counters. The `dead` bucket counts hard failures
    /// only; `forbidden`, `server_error`, and `too_many_redirects` are
    /// treated as inconclusive and land in neither bucket.
    pub async fn link_health_stats(&self) -> Result<LinkHealthStats, StoreError> {
        let row = sqlx::query(
            "SELECT
                 COUNT(*) AS total,
                 SUM(CASE WHEN status = 'alive' THEN 1 ELSE 0 END) AS alive,
                 SUM(CASE WHEN status IN
                     ('dead', 'not_found', 'connection_error', 'dns_error', 'timeout')
                     THEN 1 ELSE 0 END) AS dead,
                 SUM(CASE WHEN last_checked IS NULL THEN 1 ELSE 0 END) AS unchecked
             FROM links",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(LinkHealthStats {
            total: row.try_get("total")?,
            alive: row.try_get::<Option<i64>, _>("alive")?.unwrap_or(0),
            dead: row.try_get::<Option<i64>, _>("dead")?.unwrap_or(0),
            unchecked: row.try_get::<Option<i64>, _>("unchecked")?.unwrap_or(0),
        })
    }
}

// Snapshot operations.
impl Store {
    /// Record a successful archive attempt. Inserts a snapshot row and, for
    /// the Internet Archive, mirrors the result onto the link's convenience
    /// columns. Any success resets the link's failure counter.
    pub async fn record_snapshot_success(
        &self,
        link_id: i64,
        service: ArchiveService,
        snapshot_url: &str,
        archive_date: Option<DateTime<Utc>>,
        metadata: serde_json::Value,
    ) -> Result<i64, StoreError> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO archive_snapshots
                 (link_id, service, status, snapshot_url, archive_date, attempts,
                  metadata, created_at)
             VALUES (?, ?, 'success', ?, ?, 1, ?, ?)
             RETURNING id",
        )
        .bind(link_id)
        .bind(service.as_str())
        .bind(snapshot_url)
        .bind(archive_date)
        .bind(metadata.to_string())
        .bind(now)
        .fetch_one(&self.pool)
        .await?
        .try_get("id")?;

        if service == ArchiveService::InternetArchive {
            let tier = archive_date.map(TrustTier::from_archive_date);
            sqlx::query(
                "UPDATE links
                 SET archived = 1, archive_url = ?, archive_date = ?, trust_tier = ?,
                     archive_attempts = 0, next_retry_after = NULL
                 WHERE id = ?",
            )
            .bind(snapshot_url)
            .bind(archive_date)
            .bind(tier.map(|t| t.as_str()))
            .bind(link_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE links SET archive_attempts = 0, next_retry_after = NULL WHERE id = ?",
            )
            .bind(link_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(id)
    }

    /// Record a failed archive attempt.
    ///
    /// `attempts` counts consecutive failures for this `(link, service)`
    /// pair: the latest failed row's count plus one, or 1 after a success.
    /// Returns the new count and the backoff deadline stored on the row.
    pub async fn record_snapshot_failure(
        &self,
        link_id: i64,
        service: ArchiveService,
        error: &str,
    ) -> Result<(i64, DateTime<Utc>), StoreError> {
        let previous = sqlx::query(
            "SELECT attempts, status FROM archive_snapshots
             WHERE link_id = ? AND service = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(link_id)
        .bind(service.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let attempts = match previous {
            Some(row) if row.try_get::<String, _>("status")? == "failed" => {
                row.try_get::<i64, _>("attempts")? + 1
            }
            _ => 1,
        };

        let now = Utc::now();
        // First failure retries in ~a day, then the ladder doubles.
        let next_retry_after = now + retry_delay(attempts - 1);

        sqlx::query(
            "INSERT INTO archive_snapshots
                 (link_id, service, status, attempts, next_retry_after, error_message,
                  metadata, created_at)
             VALUES (?, ?, 'failed', ?, ?, ?, '{}', ?)",
        )
        .bind(link_id)
        .bind(service.as_str())
        .bind(attempts)
        .bind(next_retry_after)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE links SET archive_attempts = ?, next_retry_after = ? WHERE id = ?")
            .bind(attempts)
            .bind(next_retry_after)
            .bind(link_id)
            .execute(&self.pool)
            .await?;

        Ok((attempts, next_retry_after))
    }

    pub async fn get_snapshot(&self, id: i64) -> Result<Option<ArchiveSnapshot>, StoreError> {
        let row = sqlx::query("SELECT * FROM archive_snapshots WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| snapshot_from_row(&r)).transpose()
    }

    /// All snapshot rows for a link, newest first.
    pub async fn snapshots_for_link(
        &self,
        link_id: i64,
    ) -> Result<Vec<ArchiveSnapshot>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM archive_snapshots
             WHERE link_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(link_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    /// Successful local-monolith snapshots for a link, newest first.
    pub async fn monolith_snapshots(
        &self,
        link_id: i64,
    ) -> Result<Vec<ArchiveSnapshot>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM archive_snapshots
             WHERE link_id = ? AND service = 'local_monolith' AND status = 'success'
             ORDER BY created_at DESC, id DESC",
        )
        .bind(link_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    /// The newest successful snapshot for `(link, service)`, if any.
    pub async fn latest_success(
        &self,
        link_id: i64,
        service: ArchiveService,
    ) -> Result<Option<ArchiveSnapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM archive_snapshots
             WHERE link_id = ? AND service = ? AND status = 'success'
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(link_id)
        .bind(service.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| snapshot_from_row(&r)).transpose()
    }

    /// Find the newest ArchiveBox snapshot row carrying the given remote
    /// snapshot id, together with the link's URL. The id lives in the row's
    /// metadata JSON.
    pub async fn find_archivebox_snapshot(
        &self,
        snapshot_id: &str,
    ) -> Result<Option<(ArchiveSnapshot, String)>, StoreError> {
        let row = sqlx::query(
            "SELECT s.*, l.url AS link_url
             FROM archive_snapshots s
             JOIN links l ON s.link_id = l.id
             WHERE s.service = 'archivebox' AND s.metadata LIKE ?
             ORDER BY s.created_at DESC, s.id DESC
             LIMIT 1",
        )
        .bind(format!("%{snapshot_id}%"))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let url: String = row.try_get("link_url")?;
        Ok(Some((snapshot_from_row(&row)?, url)))
    }

    /// Failed snapshots eligible for retry at `now`: for each
    /// `(link, service)` pair only the newest row counts, and it must be a
    /// failure under the attempt cap with an elapsed backoff deadline.
    pub async fn get_retry_eligible_snapshots(
        &self,
        max_attempts: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ArchiveSnapshot>, StoreError> {
        let rows = sqlx::query(
            "SELECT s.* FROM archive_snapshots s
             JOIN (
                 SELECT link_id, service, MAX(id) AS latest_id
                 FROM archive_snapshots
                 GROUP BY link_id, service
             ) latest ON s.id = latest.latest_id
             WHERE s.status = 'failed'
               AND s.attempts < ?
               AND s.next_retry_after IS NOT NULL
               AND s.next_retry_after <= ?
             ORDER BY s.next_retry_after ASC
             LIMIT ?",
        )
        .bind(max_attempts)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(snapshot_from_row).collect()
    }
}

// Library operations.
impl Store {
    /// Insert a book unless one with the same `(title, author)` exists,
    /// compared case-insensitively.
    pub async fn upsert_book(
        &self,
        title: &str,
        author: &str,
        publication_year: Option<i64>,
        isbn: Option<&str>,
    ) -> Result<UpsertOutcome, StoreError> {
        let existing = sqlx::query(
            "SELECT id FROM books
             WHERE lower(trim(title)) = lower(trim(?))
               AND lower(trim(author)) = lower(trim(?))",
        )
        .bind(title)
        .bind(author)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = existing {
            return Ok(UpsertOutcome {
                id: row.try_get("id")?,
                was_new: false,
            });
        }

        let id = sqlx::query(
            "INSERT INTO books (title, author, publication_year, isbn, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(title)
        .bind(author)
        .bind(publication_year)
        .bind(isbn)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?
        .try_get("id")?;

        Ok(UpsertOutcome { id, was_new: true })
    }

    pub async fn get_book(&self, id: i64) -> Result<Option<Book>, StoreError> {
        let row = sqlx::query("SELECT * FROM books WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| book_from_row(&r)).transpose()
    }

    pub async fn list_books(&self, limit: i64, offset: i64) -> Result<Vec<Book>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM books ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(book_from_row).collect()
    }

    /// Insert a paper. Identity is the normalized DOI when present, otherwise
    /// a case-insensitive match on `(title, first_author, year)`.
    pub async fn upsert_paper(
        &self,
        title: &str,
        first_author: Option<&str>,
        year: Option<i64>,
        doi: Option<&str>,
    ) -> Result<UpsertOutcome, StoreError> {
        let doi = doi.map(normalize_doi);

        let existing = if let Some(ref doi) = doi {
            sqlx::query("SELECT id FROM papers WHERE doi = ?")
                .bind(doi)
                .fetch_optional(&self.pool)
                .await?
        } else {
            sqlx::query(
                "SELECT id FROM papers
                 WHERE doi IS NULL
                   AND lower(trim(title)) = lower(trim(?))
                   AND lower(trim(COALESCE(first_author, ''))) = lower(trim(?))
                   AND COALESCE(year, 0) = COALESCE(?, 0)",
            )
            .bind(title)
            .bind(first_author.unwrap_or(""))
            .bind(year)
            .fetch_optional(&self.pool)
            .await?
        };

        if let Some(row) = existing {
            return Ok(UpsertOutcome {
                id: row.try_get("id")?,
                was_new: false,
            });
        }

        let id = sqlx::query(
            "INSERT INTO papers (title, first_author, year, doi, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(title)
        .bind(first_author)
        .bind(year)
        .bind(doi)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?
        .try_get("id")?;

        Ok(UpsertOutcome { id, was_new: true })
    }

    pub async fn get_paper(&self, id: i64) -> Result<Option<Paper>, StoreError> {
        let row = sqlx::query("SELECT * FROM papers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| paper_from_row(&r)).transpose()
    }

    pub async fn list_papers(&self, limit: i64, offset: i64) -> Result<Vec<Paper>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM papers ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(paper_from_row).collect()
    }
}

// User, token, and setting operations.
impl Store {
    pub async fn get_or_create_user(
        &self,
        telegram_user_id: i64,
        telegram_username: Option<&str>,
    ) -> Result<User, StoreError> {
        sqlx::query(
            "INSERT INTO users (telegram_user_id, telegram_username, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(telegram_user_id) DO UPDATE
             SET telegram_username = COALESCE(excluded.telegram_username, telegram_username)",
        )
        .bind(telegram_user_id)
        .bind(telegram_username)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM users WHERE telegram_user_id = ?")
            .bind(telegram_user_id)
            .fetch_one(&self.pool)
            .await?;
        user_from_row(&row)
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| user_from_row(&r)).transpose()
    }

    pub async fn create_auth_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query(
            "INSERT INTO auth_tokens (user_id, token, created_at, expires_at)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(user_id)
        .bind(token)
        .bind(Utc::now())
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?
        .try_get("id")?;
        Ok(id)
    }

    /// Atomically consume a magic-link token: marks it used and returns the
    /// owning user id, or `None` if the token is unknown, already used, or
    /// expired. Single-use is enforced by the conditional UPDATE.
    pub async fn consume_auth_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query(
            "UPDATE auth_tokens
             SET used_at = ?, ip_address = ?, user_agent = ?
             WHERE token = ? AND used_at IS NULL AND expires_at > ?
             RETURNING user_id",
        )
        .bind(now)
        .bind(ip_address)
        .bind(user_agent)
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user_id: i64 = row.try_get("user_id")?;

        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(Some(user_id))
    }

    pub async fn get_auth_token(
        &self,
        token: &str,
    ) -> Result<Option<holocene_core::AuthToken>, StoreError> {
        let row = sqlx::query("SELECT * FROM auth_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| auth_token_from_row(&r)).transpose()
    }

    pub async fn create_api_token(
        &self,
        user_id: i64,
        token: &str,
        name: &str,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query(
            "INSERT INTO api_tokens (user_id, token, name, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(user_id)
        .bind(token)
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?
        .try_get("id")?;
        Ok(id)
    }

    /// Validate a bearer token by exact match. Revoked tokens fail; valid
    /// tokens get `last_used_at` refreshed.
    pub async fn validate_api_token(&self, token: &str) -> Result<Option<ApiToken>, StoreError> {
        let row = sqlx::query("SELECT * FROM api_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let api_token = api_token_from_row(&row)?;
        if !api_token.is_valid() {
            return Ok(None);
        }

        sqlx::query("UPDATE api_tokens SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(api_token.id)
            .execute(&self.pool)
            .await?;

        Ok(Some(api_token))
    }

    pub async fn revoke_api_token(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE api_tokens SET revoked_at = ? WHERE token = ? AND revoked_at IS NULL",
        )
        .bind(Utc::now())
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM daemon_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get("value").map_err(StoreError::from))
            .transpose()
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO daemon_settings (key, value, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_metadata(raw: String) -> Result<serde_json::Value, StoreError> {
    Ok(serde_json::from_str(&raw)?)
}

fn link_from_row(row: &SqliteRow) -> Result<Link, StoreError> {
    let status: Option<String> = row.try_get("status")?;
    let trust_tier: Option<String> = row.try_get("trust_tier")?;
    Ok(Link {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        source: row.try_get("source")?,
        title: row.try_get("title")?,
        first_seen: row.try_get("first_seen")?,
        last_seen: row.try_get("last_seen")?,
        last_checked: row.try_get("last_checked")?,
        status: status.as_deref().map(LinkStatus::parse).transpose()?,
        status_code: row.try_get("status_code")?,
        response_time_ms: row.try_get("response_time_ms")?,
        archived: row.try_get("archived")?,
        archive_url: row.try_get("archive_url")?,
        archive_date: row.try_get("archive_date")?,
        trust_tier: trust_tier.as_deref().map(TrustTier::parse).transpose()?,
        archive_attempts: row.try_get("archive_attempts")?,
        next_retry_after: row.try_get("next_retry_after")?,
        metadata: parse_metadata(row.try_get("metadata")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> Result<ArchiveSnapshot, StoreError> {
    let service: String = row.try_get("service")?;
    let status: String = row.try_get("status")?;
    Ok(ArchiveSnapshot {
        id: row.try_get("id")?,
        link_id: row.try_get("link_id")?,
        service: ArchiveService::parse(&service)?,
        status: SnapshotStatus::parse(&status)?,
        snapshot_url: row.try_get("snapshot_url")?,
        archive_date: row.try_get("archive_date")?,
        attempts: row.try_get("attempts")?,
        next_retry_after: row.try_get("next_retry_after")?,
        error_message: row.try_get("error_message")?,
        metadata: parse_metadata(row.try_get("metadata")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn book_from_row(row: &SqliteRow) -> Result<Book, StoreError> {
    let reading_status: Option<String> = row.try_get("reading_status")?;
    Ok(Book {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        publication_year: row.try_get("publication_year")?,
        isbn: row.try_get("isbn")?,
        dewey_decimal: row.try_get("dewey_decimal")?,
        cutter_number: row.try_get("cutter_number")?,
        call_number: row.try_get("call_number")?,
        reading_status: reading_status
            .as_deref()
            .map(ReadingStatus::parse)
            .transpose()?,
        enriched_at: row.try_get("enriched_at")?,
        metadata: parse_metadata(row.try_get("metadata")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn paper_from_row(row: &SqliteRow) -> Result<Paper, StoreError> {
    let reading_status: Option<String> = row.try_get("reading_status")?;
    Ok(Paper {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        first_author: row.try_get("first_author")?,
        year: row.try_get("year")?,
        doi: row.try_get("doi")?,
        udc_number: row.try_get("udc_number")?,
        call_number: row.try_get("call_number")?,
        reading_status: reading_status
            .as_deref()
            .map(ReadingStatus::parse)
            .transpose()?,
        metadata: parse_metadata(row.try_get("metadata")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        telegram_user_id: row.try_get("telegram_user_id")?,
        telegram_username: row.try_get("telegram_username")?,
        is_admin: row.try_get("is_admin")?,
        created_at: row.try_get("created_at")?,
        last_login_at: row.try_get("last_login_at")?,
    })
}

fn auth_token_from_row(row: &SqliteRow) -> Result<holocene_core::AuthToken, StoreError> {
    Ok(holocene_core::AuthToken {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        token: row.try_get("token")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        used_at: row.try_get("used_at")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
    })
}

fn api_token_from_row(row: &SqliteRow) -> Result<ApiToken, StoreError> {
    Ok(ApiToken {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        token: row.try_get("token")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
        last_used_at: row.try_get("last_used_at")?,
        revoked_at: row.try_get("revoked_at")?,
    })
}
