//! # runtara-orm
//!
//! A lightweight data-access layer for PostgreSQL.
//!
//! This crate composes SQL at runtime and turns untyped result rows into
//! caller-supplied types, without a schema known at compile time.
//!
//! ## Features
//!
//! - **Migration Runner**: Applies ordered SQL files exactly once, each in its own transaction
//! - **Query Builder**: Fluent SELECT composition with condition groups, joins, grouping and paging
//! - **Row Materializer**: Decodes rows by column type and reshapes them into any `Deserialize` type
//! - **Table Accessor**: Single-statement create, read, update and delete by field lists
//! - **Transactions**: One transaction can span several builders and table calls
//! - **SQL Injection Prevention**: Identifiers are validated, values always travel as bound arguments
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runtara_orm::{Database, DatabaseConfig, Fields, QueryBuilder};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect(&DatabaseConfig::from_env()?).await?;
//!
//!     // Apply pending migrations
//!     db.migrator().migrate("./migrations").await?;
//!
//!     // Insert through the table accessor
//!     let users = db.table("users")?;
//!     users
//!         .create(&Fields::new().set("name", "John Doe").set("age", 30))
//!         .await?;
//!
//!     // Query with the builder
//!     let adults: Vec<User> = QueryBuilder::new("users")
//!         .select(["id", "name"])
//!         .filter("age > $1", [18])
//!         .order("name ASC")
//!         .fetch_all(db.pool())
//!         .await?;
//!
//!     // Read a single row
//!     let first: User = users.read(&["id", "name"], "id = $1", [1]).await?.one()?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! `DatabaseConfig` is read from the environment (and a `.env` file) or built
//! explicitly:
//!
//! ```rust
//! use runtara_orm::DatabaseConfig;
//!
//! let config = DatabaseConfig::builder("app", "app_db")
//!     .host("db.internal")   // Default "localhost"
//!     .port(5433)            // Default 5432
//!     .password("secret")
//!     .max_connections(20)   // Default 10
//!     .build();
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod materialize;
pub mod migrate;
pub mod pagination;
pub mod sql;
pub mod table;
pub mod transaction;
pub mod value;

// Re-export main types for convenience
pub use config::{DatabaseConfig, DatabaseConfigBuilder};
pub use database::Database;
pub use error::{OrmError, Result};
pub use materialize::{Document, Record, Rows, materialize_all, materialize_one};
pub use migrate::{MIGRATIONS_TABLE, MigrationStatus, Migrator};
pub use pagination::Pagination;
pub use sql::{BoolOp, JoinKind, QueryBuilder, Statement};
pub use table::{Fields, Table};
pub use transaction::Transaction;
pub use value::Value;

// Re-export SQL utilities for advanced users
pub use sql::sanitize::{quote_identifier, validate_identifier};
