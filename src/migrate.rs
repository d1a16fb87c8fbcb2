//! Migration runner
//!
//! Applies the SQL files of a directory in file-name order, each one in its
//! own transaction together with its row in the tracking table. A file whose
//! name is already recorded is never applied again. A failing file is rolled
//! back and aborts the run; files committed before it stay applied.
//!
//! The whole run holds a session advisory lock on one dedicated connection,
//! so concurrent runners against the same database apply files one at a time
//! and never race on the tracking table.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgConnection, PgPool, Postgres};

use crate::error::{OrmError, Result};

/// Name of the tracking table
pub const MIGRATIONS_TABLE: &str = "_migrations";

/// Key of the session advisory lock taken for a run
pub const MIGRATION_LOCK_KEY: i64 = 0x5f6d_6967_7261_7465;

/// Applied and pending migrations of a directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Names recorded in the tracking table, sorted
    pub applied: Vec<String>,
    /// Files in the directory not recorded yet, in apply order
    pub pending: Vec<String>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Migrator {
    pool: PgPool,
}

impl Migrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply every pending file in `dir`, returning the names applied by this run
    pub async fn migrate(&self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let dir = dir.as_ref();
        let files = list_migration_files(dir).await?;

        let mut lock = MigrationLock::acquire(&self.pool).await?;
        let outcome = run_locked(&mut lock.conn, dir, &files).await;
        lock.release().await;

        let applied = outcome?;
        tracing::info!(
            applied = applied.len(),
            total = files.len(),
            "migrations complete"
        );
        Ok(applied)
    }

    /// Compare `dir` with the tracking table without applying anything
    pub async fn status(&self, dir: impl AsRef<Path>) -> Result<MigrationStatus> {
        let files = list_migration_files(dir.as_ref()).await?;
        let applied = self.applied().await?;
        let recorded: HashSet<&str> = applied.iter().map(String::as_str).collect();
        let pending = pending_migrations(&files, &recorded)
            .into_iter()
            .cloned()
            .collect();
        Ok(MigrationStatus { applied, pending })
    }

    /// Names recorded in the tracking table; empty when it does not exist yet
    pub async fn applied(&self) -> Result<Vec<String>> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT to_regclass($1::text) IS NOT NULL")
            .bind(MIGRATIONS_TABLE)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Ok(Vec::new());
        }

        let mut names = sqlx::query_scalar::<_, String>(&format!(
            "SELECT name FROM {}",
            MIGRATIONS_TABLE
        ))
        .fetch_all(&self.pool)
        .await?;
        names.sort();
        Ok(names)
    }
}

async fn run_locked(conn: &mut PgConnection, dir: &Path, files: &[String]) -> Result<Vec<String>> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY)",
        MIGRATIONS_TABLE
    ))
    .execute(&mut *conn)
    .await
    .map_err(|e| OrmError::migration(MIGRATIONS_TABLE, e))?;

    let recorded: HashSet<String> =
        sqlx::query_scalar::<_, String>(&format!("SELECT name FROM {}", MIGRATIONS_TABLE))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| OrmError::migration(MIGRATIONS_TABLE, e))?
            .into_iter()
            .collect();

    let mut applied = Vec::new();
    for name in files {
        if recorded.contains(name) {
            tracing::debug!(migration = %name, "migration already applied, skipping");
            continue;
        }

        let path = dir.join(name);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| OrmError::migration_io(&path, e))?;

        apply_one(conn, name, &content).await?;
        tracing::info!(migration = %name, "migration applied");
        applied.push(name.clone());
    }

    Ok(applied)
}

async fn apply_one(conn: &mut PgConnection, name: &str, content: &str) -> Result<()> {
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| OrmError::migration(name, e))?;

    let result = async {
        sqlx::raw_sql(content).execute(&mut *tx).await?;
        sqlx::query(&format!("INSERT INTO {} (name) VALUES ($1)", MIGRATIONS_TABLE))
            .bind(name)
            .execute(&mut *tx)
            .await?;
        Ok::<_, sqlx::Error>(())
    }
    .await;

    match result {
        Ok(()) => tx.commit().await.map_err(|e| OrmError::migration(name, e)),
        Err(e) => {
            tracing::warn!(migration = %name, error = %e, "migration failed, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(migration = %name, error = %rollback_err, "rollback failed");
            }
            Err(OrmError::migration(name, e))
        }
    }
}

/// Session advisory lock held on one pooled connection
///
/// If the guard is dropped while the lock is still held, for example when the
/// `migrate` future is cancelled, the connection is closed instead of going
/// back to the pool; closing the session drops every lock it holds.
struct MigrationLock {
    conn: PoolConnection<Postgres>,
    held: bool,
}

impl MigrationLock {
    async fn acquire(pool: &PgPool) -> Result<Self> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| OrmError::migration(MIGRATIONS_TABLE, e))?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await
            .map_err(|e| OrmError::migration(MIGRATIONS_TABLE, e))?;
        tracing::debug!(key = MIGRATION_LOCK_KEY, "migration lock acquired");

        Ok(Self { conn, held: true })
    }

    async fn release(mut self) {
        let unlocked = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *self.conn)
            .await;

        match unlocked {
            Ok(_) => {
                self.held = false;
                tracing::debug!(key = MIGRATION_LOCK_KEY, "migration lock released");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to release migration lock, closing connection");
            }
        }
    }
}

impl Drop for MigrationLock {
    fn drop(&mut self) {
        if self.held {
            self.conn.close_on_drop();
        }
    }
}

/// Regular files directly inside `dir`, sorted by name
pub async fn list_migration_files(dir: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| OrmError::migration_io(dir, e))?;

    let mut names = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return Err(OrmError::migration_io(dir, e)),
        };
        let path: PathBuf = entry.path();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| OrmError::migration_io(&path, e))?;
        if !metadata.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => {
                tracing::warn!(file = ?name, "skipping migration file with a non UTF-8 name");
            }
        }
    }

    names.sort();
    Ok(names)
}

fn pending_migrations<'a>(files: &'a [String], recorded: &HashSet<&str>) -> Vec<&'a String> {
    files
        .iter()
        .filter(|name| !recorded.contains(name.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, sql: &str) {
        std::fs::write(dir.join(name), sql).unwrap();
    }

    // =========================================================================
    // File Listing Tests
    // =========================================================================

    #[tokio::test]
    async fn test_files_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "003_indexes.sql", "SELECT 1;");
        write(dir.path(), "001_users.sql", "SELECT 1;");
        write(dir.path(), "002_posts.sql", "SELECT 1;");

        let files = list_migration_files(dir.path()).await.unwrap();
        assert_eq!(files, ["001_users.sql", "002_posts.sql", "003_indexes.sql"]);
    }

    #[tokio::test]
    async fn test_subdirectories_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_users.sql", "SELECT 1;");
        std::fs::create_dir(dir.path().join("archive")).unwrap();

        let files = list_migration_files(dir.path()).await.unwrap();
        assert_eq!(files, ["001_users.sql"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_names_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "001_users.sql", "SELECT 1;");
        std::fs::write(dir.path().join(OsStr::from_bytes(b"002_\xff.sql")), "SELECT 1;").unwrap();

        let files = list_migration_files(dir.path()).await.unwrap();
        assert_eq!(files, ["001_users.sql"]);
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_migration_files(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = list_migration_files(&missing).await.unwrap_err();
        assert!(matches!(err, OrmError::MigrationIo { .. }));
    }

    // =========================================================================
    // Pending Selection Tests
    // =========================================================================

    #[test]
    fn test_pending_excludes_recorded() {
        let files = vec![
            "001_a.sql".to_string(),
            "002_b.sql".to_string(),
            "003_c.sql".to_string(),
        ];
        let recorded: HashSet<&str> = ["001_a.sql", "003_c.sql", "000_removed.sql"]
            .into_iter()
            .collect();
        let pending = pending_migrations(&files, &recorded);
        assert_eq!(pending, [&"002_b.sql".to_string()]);
    }

    #[test]
    fn test_status_up_to_date() {
        let status = MigrationStatus {
            applied: vec!["001_a.sql".to_string()],
            pending: Vec::new(),
        };
        assert!(status.is_up_to_date());
    }
}
