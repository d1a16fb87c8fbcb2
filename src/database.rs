//! Database - entry point holding the shared connection pool
//!
//! The pool is safe to share between concurrent callers; builders,
//! tables and transactions created from it are single-owner values.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgPool};

use crate::config::DatabaseConfig;
use crate::error::{OrmError, Result};
use crate::migrate::Migrator;
use crate::sql::QueryBuilder;
use crate::table::Table;
use crate::transaction::Transaction;

/// Handle to a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open a pool from configuration and verify it with a ping
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = config.connect_options()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| OrmError::connection(format!("Database connection failed: {}", e)))?;

        let database = Self { pool };
        database.ping().await?;

        tracing::info!(
            max_connections = config.max_connections,
            "database connection established"
        );
        Ok(database)
    }

    /// Wrap an existing pool
    ///
    /// Use this when the pool is shared with code outside this crate.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check that a pooled connection answers
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| OrmError::connection(format!("Failed to acquire connection: {}", e)))?;
        conn.ping()
            .await
            .map_err(|e| OrmError::connection(format!("Database ping failed: {}", e)))
    }

    /// Start a query builder for `table`
    pub fn query(&self, table: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(table)
    }

    /// Table accessor bound to this pool
    pub fn table(&self, name: impl Into<String>) -> Result<Table> {
        Table::new(self.pool.clone(), name)
    }

    pub fn migrator(&self) -> Migrator {
        Migrator::new(self.pool.clone())
    }

    pub async fn begin(&self) -> Result<Transaction> {
        Transaction::begin(&self.pool).await
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
