use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, Pool, Row, Sqlite, Transaction};
use sqlx::sqlite::SqliteRow;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{Commit, FetchRecord, NewRepository, RepositoryRecord};

use super::SCHEMA_VERSION;

const REPOSITORY_COLUMNS: &str =
    "owner, name, ssh_url, default_branch, cloned, path, credential_counts, failed_fetches";

/// Forward migrations; entry `n` upgrades a database from version `n` to `n + 1`.
/// Existing entries are never edited, only appended to.
const MIGRATIONS: &[&[&str]] = &[
    // 1: repositories, insert-only commit ledger, fetch history
    &[
        "CREATE TABLE IF NOT EXISTS repositories (
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            ssh_url TEXT NOT NULL,
            default_branch TEXT NOT NULL,
            cloned INTEGER NOT NULL DEFAULT 0,
            path TEXT,
            credential_counts TEXT NOT NULL DEFAULT '{}',
            failed_fetches INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (owner, name)
        )",
        "CREATE TABLE IF NOT EXISTS commits (
            owner TEXT NOT NULL,
            repository TEXT NOT NULL,
            sha TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (owner, repository, sha)
        )",
        "CREATE TABLE IF NOT EXISTS fetches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            path TEXT NOT NULL,
            changes TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
    ],
];

fn parse_version(version: &str) -> Result<usize> {
    version
        .parse()
        .map_err(|_| Error::Schema(format!("unrecognised schema version {:?}", version)))
}

/// Database abstraction for SQLite operations
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Configure connection options with PRAGMAs applied to every connection
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .pragma("temp_store", "MEMORY");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Bring the schema up to [`SCHEMA_VERSION`], returns true if any migration ran.
    ///
    /// Migrations only move forward and never drop ledger rows. A database
    /// written by a newer build is refused.
    pub async fn init_schema(&self) -> Result<bool> {
        // Create metadata table first (needed to check version)
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )"
        ).execute(&self.pool).await?;

        let stored_version: Option<String> = sqlx::query("SELECT value FROM metadata WHERE key = 'schema_version'")
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.get("value"));

        let current = parse_version(SCHEMA_VERSION)?;
        let applied = match stored_version.as_deref() {
            None => 0,
            Some(stored) => parse_version(stored)?,
        };
        if applied > current {
            return Err(Error::Schema(format!(
                "database schema version {} is newer than supported version {}",
                applied, current
            )));
        }
        if applied == current {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        for (idx, statements) in MIGRATIONS.iter().enumerate().skip(applied) {
            for statement in statements.iter() {
                sqlx::query(*statement).execute(&mut *tx).await?;
            }
            debug!(version = idx + 1, "applied schema migration");
        }
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?)")
            .bind(SCHEMA_VERSION)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(from = applied, to = current, "schema migrated");
        Ok(true)
    }

    /// Get metadata value by key
    pub async fn get_metadata(&self, key: &str) -> Option<String> {
        sqlx::query("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .map(|row| row.get("value"))
    }

    /// Set metadata value
    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn commit_exists(&self, owner: &str, repository: &str, sha: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM commits WHERE owner = ? AND repository = ? AND sha = ?")
            .bind(owner)
            .bind(repository)
            .bind(sha)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Insert the commit and clear the repository's failed fetch counter in ONE transaction.
    ///
    /// Registering an already registered commit is a no-op.
    pub async fn insert_commit(&self, commit: &Commit) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT OR IGNORE INTO commits (owner, repository, sha, timestamp, created_at)
             VALUES (?, ?, ?, ?, ?)"
        )
        .bind(&commit.owner)
        .bind(&commit.repository)
        .bind(&commit.sha)
        .bind(commit.timestamp)
        .bind(now())
        .execute(&mut *tx)
        .await?;

        self.reset_failed_fetches_in_tx(&mut tx, &commit.owner, &commit.repository)
            .await?;

        tx.commit().await?;
        debug!(owner = %commit.owner, repository = %commit.repository, sha = %commit.sha, "commit registered");
        Ok(())
    }

    /// Number of registered commits for a repository
    pub async fn commit_count(&self, owner: &str, repository: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM commits WHERE owner = ? AND repository = ?")
            .bind(owner)
            .bind(repository)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn insert_repository(&self, repo: &NewRepository) -> Result<()> {
        let now = now();
        sqlx::query(
            "INSERT OR IGNORE INTO repositories
                (owner, name, ssh_url, default_branch, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(&repo.owner)
        .bind(&repo.name)
        .bind(&repo.ssh_url)
        .bind(&repo.default_branch)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_repository(&self, owner: &str, name: &str) -> Result<Option<RepositoryRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM repositories WHERE owner = ? AND name = ?",
            REPOSITORY_COLUMNS
        ))
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| repository_from_row(&row)).transpose()
    }

    pub async fn all_repositories(&self) -> Result<Vec<RepositoryRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM repositories ORDER BY owner, name",
            REPOSITORY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(repository_from_row).collect()
    }

    pub async fn mark_repository_cloned(&self, owner: &str, name: &str, path: &str) -> Result<()> {
        sqlx::query(
            "UPDATE repositories SET cloned = 1, path = ?, updated_at = ? WHERE owner = ? AND name = ?"
        )
        .bind(path)
        .bind(now())
        .bind(owner)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn increment_failed_fetches(&self, owner: &str, name: &str) -> Result<()> {
        sqlx::query(
            "UPDATE repositories SET failed_fetches = failed_fetches + 1, updated_at = ?
             WHERE owner = ? AND name = ?"
        )
        .bind(now())
        .bind(owner)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_credential_counts(
        &self,
        owner: &str,
        name: &str,
        counts: &BTreeMap<String, u64>,
    ) -> Result<()> {
        let json = serde_json::to_string(counts)?;
        sqlx::query(
            "UPDATE repositories SET credential_counts = ?, updated_at = ? WHERE owner = ? AND name = ?"
        )
        .bind(json)
        .bind(now())
        .bind(owner)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store a fetch row and clear the failed fetch counter in ONE transaction.
    pub async fn insert_fetch(&self, owner: &str, name: &str, fetch: &FetchRecord) -> Result<()> {
        let changes = serde_json::to_string(&fetch.changes)?;
        let mut tx = self.pool.begin().await?;

        self.reset_failed_fetches_in_tx(&mut tx, owner, name).await?;

        sqlx::query(
            "INSERT INTO fetches (owner, name, path, changes, created_at) VALUES (?, ?, ?, ?, ?)"
        )
        .bind(owner)
        .bind(name)
        .bind(&fetch.path)
        .bind(changes)
        .bind(now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Number of fetches recorded for a repository
    pub async fn fetch_count(&self, owner: &str, name: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fetches WHERE owner = ? AND name = ?")
            .bind(owner)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn reset_failed_fetches_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        owner: &str,
        name: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE repositories SET failed_fetches = 0, updated_at = ? WHERE owner = ? AND name = ?"
        )
        .bind(now())
        .bind(owner)
        .bind(name)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn repository_from_row(row: &SqliteRow) -> Result<RepositoryRecord> {
    let counts_json: String = row.get("credential_counts");
    Ok(RepositoryRecord {
        owner: row.get("owner"),
        name: row.get("name"),
        ssh_url: row.get("ssh_url"),
        default_branch: row.get("default_branch"),
        cloned: row.get::<i64, _>("cloned") != 0,
        path: row.get("path"),
        credential_counts: parse_credential_counts(&counts_json)?,
        failed_fetches: row.get("failed_fetches"),
    })
}

/// Counts may have been written as floats by other writers; normalize to integers.
pub(crate) fn parse_credential_counts(json: &str) -> Result<BTreeMap<String, u64>> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
    map.into_iter()
        .map(|(branch, value)| {
            let count = value
                .as_u64()
                .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
                .ok_or_else(|| Error::Scan(format!("non-numeric count for branch {}", branch)))?;
            Ok((branch, count))
        })
        .collect()
}

fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
