//! Owned database transaction
//!
//! `commit` and `rollback` consume the handle, so a transaction cannot be
//! finished twice. Dropping an unfinished transaction rolls it back.
//!
//! The transaction dereferences to the underlying connection, so builders
//! and statements run inside it by passing `&mut *tx` as the executor:
//!
//! ```rust,no_run
//! # async fn example(db: runtara_orm::Database) -> runtara_orm::Result<()> {
//! use runtara_orm::sql::QueryBuilder;
//!
//! let mut tx = db.begin().await?;
//! let ids: Vec<serde_json::Value> = QueryBuilder::new("users")
//!     .select(["id"])
//!     .fetch_all(&mut *tx)
//!     .await?;
//! tx.commit().await?;
//! # Ok(()) }
//! ```

use std::ops::{Deref, DerefMut};

use sqlx::{PgConnection, PgPool, Postgres};

use crate::error::Result;

pub struct Transaction {
    inner: sqlx::Transaction<'static, Postgres>,
}

impl Transaction {
    pub(crate) async fn begin(pool: &PgPool) -> Result<Self> {
        let inner = pool.begin().await?;
        tracing::debug!("transaction started");
        Ok(Self { inner })
    }

    pub async fn commit(self) -> Result<()> {
        self.inner.commit().await?;
        tracing::debug!("transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.inner.rollback().await?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }
}

impl Deref for Transaction {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        &self.inner
    }
}

impl DerefMut for Transaction {
    fn deref_mut(&mut self) -> &mut PgConnection {
        &mut self.inner
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction").finish_non_exhaustive()
    }
}
