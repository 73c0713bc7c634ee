//! The witness's per-origin record store.
//!
//! One row per log origin: the note verifier key it was registered with
//! and the `(tree_size, tree_hash)` pair the witness last proved
//! consistent. All queries are written with `?` placeholders and rewritten
//! per dialect, so one implementation serves sqlite, mysql and postgres
//! DSNs through the `Any` driver.

use std::borrow::Cow;

use sqlx::any::{AnyPoolOptions, install_default_drivers};
use sqlx::{AnyPool, Row};
use tracing::info;

use crate::rebind::rebind;

/// Database backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// SQLite, file-backed.
    Sqlite,
    /// MySQL / MariaDB.
    Mysql,
    /// PostgreSQL (uses `$N` placeholders).
    Postgres,
}

impl Dialect {
    /// Parse a `--db-type` flag value.
    pub fn from_db_type(s: &str) -> Option<Self> {
        match s {
            "sqlite" => Some(Self::Sqlite),
            "mysql" => Some(Self::Mysql),
            "postgres" => Some(Self::Postgres),
            _ => None,
        }
    }

    fn prepare<'a>(&self, query: &'a str) -> Cow<'a, str> {
        match self {
            Self::Postgres => Cow::Owned(rebind(query)),
            _ => Cow::Borrowed(query),
        }
    }
}

/// Errors from the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Driver-level failure.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// One registered log.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Note verifier key the origin was registered with.
    pub public_key: String,
    /// Last verified tree size.
    pub tree_size: u64,
    /// Last verified root hash, base64-encoded.
    pub tree_hash: String,
}

/// Handle to the `tlog` table.
#[derive(Clone)]
pub struct WitnessDb {
    pool: AnyPool,
    dialect: Dialect,
}

impl WitnessDb {
    /// Connect to the database and ensure the schema exists.
    ///
    /// For sqlite the pool is capped at one connection and WAL mode plus a
    /// 1s busy timeout are enabled.
    pub async fn connect(dialect: Dialect, dsn: &str) -> Result<Self, StoreError> {
        install_default_drivers();
        let max_connections = match dialect {
            Dialect::Sqlite => 1,
            _ => 5,
        };
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(dsn)
            .await?;
        let db = Self { pool, dialect };

        if dialect == Dialect::Sqlite {
            sqlx::query("PRAGMA journal_mode=WAL").execute(&db.pool).await?;
            sqlx::query("PRAGMA busy_timeout=1000").execute(&db.pool).await?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tlog (
                origin VARCHAR(255) PRIMARY KEY,
                public_key TEXT NOT NULL,
                tree_size INTEGER NOT NULL,
                tree_hash TEXT NOT NULL
            )",
        )
        .execute(&db.pool)
        .await?;
        Ok(db)
    }

    /// Fetch the record for `origin`, if registered.
    pub async fn lookup(&self, origin: &str) -> Result<Option<LogRecord>, StoreError> {
        let query = self
            .dialect
            .prepare("SELECT public_key, tree_size, tree_hash FROM tlog WHERE origin = ?");
        let row = sqlx::query(&query)
            .bind(origin)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(LogRecord {
                public_key: row.try_get("public_key")?,
                tree_size: row.try_get::<i64, _>("tree_size")? as u64,
                tree_hash: row.try_get("tree_hash")?,
            }),
            None => None,
        })
    }

    /// Compare-and-swap the verified state for `origin`: the update only
    /// applies where `tree_size` still equals `old_size`. Returns whether a
    /// row was updated; `false` means a concurrent request won the race.
    pub async fn cas_update(
        &self,
        origin: &str,
        old_size: u64,
        new_size: u64,
        new_hash: &str,
    ) -> Result<bool, StoreError> {
        let query = self
            .dialect
            .prepare("UPDATE tlog SET tree_size = ?, tree_hash = ? WHERE origin = ? AND tree_size = ?");
        let result = sqlx::query(&query)
            .bind(new_size as i64)
            .bind(new_hash)
            .bind(origin)
            .bind(old_size as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Current verified size for `origin`.
    pub async fn tree_size(&self, origin: &str) -> Result<Option<u64>, StoreError> {
        let query = self
            .dialect
            .prepare("SELECT tree_size FROM tlog WHERE origin = ?");
        let row = sqlx::query(&query)
            .bind(origin)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get::<i64, _>("tree_size")? as u64),
            None => None,
        })
    }

    /// Register a log under its verifier key with `(size, hash)` starting
    /// state. Returns `false` (without modifying the row) if the origin is
    /// already registered.
    pub async fn register(
        &self,
        origin: &str,
        public_key: &str,
        tree_size: u64,
        tree_hash: &str,
    ) -> Result<bool, StoreError> {
        let count_query = self
            .dialect
            .prepare("SELECT COUNT(*) AS n FROM tlog WHERE origin = ?");
        let count: i64 = sqlx::query(&count_query)
            .bind(origin)
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        if count > 0 {
            return Ok(false);
        }

        let insert_query = self
            .dialect
            .prepare("INSERT INTO tlog (origin, public_key, tree_size, tree_hash) VALUES (?, ?, ?, ?)");
        let result = sqlx::query(&insert_query)
            .bind(origin)
            .bind(public_key)
            .bind(tree_size as i64)
            .bind(tree_hash)
            .execute(&self.pool)
            .await?;
        info!(origin, "registered log origin");
        Ok(result.rows_affected() == 1)
    }
}
