//! Table accessor - single-statement CRUD by ordered field lists
//!
//! Independent of [`QueryBuilder`](crate::sql::QueryBuilder): each call
//! renders one parameterized statement and runs it on the pool. Table and
//! column names are validated and quoted; WHERE clauses are trusted SQL
//! templates with `$n` placeholders for their arguments.
//!
//! The `*_statement` methods expose the rendered SQL, which lets callers
//! run the same statements inside a transaction.

use sqlx::PgPool;
use sqlx::postgres::PgQueryResult;

use crate::error::{OrmError, Result};
use crate::materialize::Rows;
use crate::sql::Statement;
use crate::sql::sanitize::{quote_identifier, quote_qualified, validate_identifier, validate_qualified};
use crate::value::Value;

/// Column/value pairs in the order they should appear in the statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, Value)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column value
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((column.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    fn validate(&self) -> Result<()> {
        for (column, _) in &self.entries {
            validate_identifier(column).map_err(OrmError::Validation)?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A table name bound to a pool
#[derive(Debug, Clone)]
pub struct Table {
    pool: PgPool,
    name: String,
}

impl Table {
    /// Bind `name` (`users` or `schema.users`) to `pool`
    pub fn new(pool: PgPool, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_qualified(&name).map_err(OrmError::Validation)?;
        Ok(Self { pool, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `INSERT INTO t ("a", "b") VALUES ($1, $2)`
    ///
    /// `Value::Null` fields render as the `NULL` keyword so they fit any
    /// column type. No fields renders `DEFAULT VALUES`.
    pub fn insert_statement(&self, fields: &Fields) -> Result<Statement> {
        self.insert_sql(fields, None)
    }

    fn insert_sql(&self, fields: &Fields, returning: Option<&[&str]>) -> Result<Statement> {
        fields.validate()?;
        let table = quote_qualified(&self.name);

        let mut args = Vec::new();
        let mut sql = if fields.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let mut columns = Vec::with_capacity(fields.len());
            let mut placeholders = Vec::with_capacity(fields.len());
            for (column, value) in fields.iter() {
                columns.push(quote_identifier(column));
                if value.is_null() {
                    placeholders.push("NULL".to_string());
                } else {
                    args.push(value.clone());
                    placeholders.push(format!("${}", args.len()));
                }
            }
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        if let Some(columns) = returning {
            sql.push_str(&format!(" RETURNING {}", column_list(columns)?));
        }
        Ok(Statement::new(sql, args))
    }

    /// `SELECT cols FROM t [WHERE ...]`; no columns selects `*`
    pub fn select_statement<I, V>(
        &self,
        columns: &[&str],
        where_clause: &str,
        args: I,
    ) -> Result<Statement>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut sql = format!(
            "SELECT {} FROM {}",
            column_list(columns)?,
            quote_qualified(&self.name)
        );
        if !where_clause.trim().is_empty() {
            sql.push_str(&format!(" WHERE {}", where_clause));
        }
        Ok(Statement::new(sql, collect_args(args)))
    }

    /// `UPDATE t SET ... WHERE ...`
    ///
    /// The WHERE arguments take `$1..$m` exactly as the clause was written;
    /// SET values are numbered after them.
    pub fn update_statement<I, V>(
        &self,
        where_clause: &str,
        fields: &Fields,
        args: I,
    ) -> Result<Statement>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        fields.validate()?;
        if fields.is_empty() {
            return Err(OrmError::validation("Update requires at least one field"));
        }
        require_where(where_clause, "Update")?;

        let mut args = collect_args(args);
        let mut assignments = Vec::with_capacity(fields.len());
        for (column, value) in fields.iter() {
            if value.is_null() {
                assignments.push(format!("{} = NULL", quote_identifier(column)));
            } else {
                args.push(value.clone());
                assignments.push(format!("{} = ${}", quote_identifier(column), args.len()));
            }
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_qualified(&self.name),
            assignments.join(", "),
            where_clause
        );
        Ok(Statement::new(sql, args))
    }

    /// `DELETE FROM t WHERE ...`
    pub fn delete_statement<I, V>(&self, where_clause: &str, args: I) -> Result<Statement>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        require_where(where_clause, "Delete")?;
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            quote_qualified(&self.name),
            where_clause
        );
        Ok(Statement::new(sql, collect_args(args)))
    }

    /// Insert one row
    pub async fn create(&self, fields: &Fields) -> Result<PgQueryResult> {
        self.insert_statement(fields)?.execute(&self.pool).await
    }

    /// Insert one row and return the requested columns of it
    pub async fn create_returning(&self, fields: &Fields, returning: &[&str]) -> Result<Rows> {
        self.insert_sql(fields, Some(returning))?
            .query(&self.pool)
            .await
    }

    /// Select rows; materialize them with [`Rows::one`] or [`Rows::all`]
    pub async fn read<I, V>(&self, columns: &[&str], where_clause: &str, args: I) -> Result<Rows>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.select_statement(columns, where_clause, args)?
            .query(&self.pool)
            .await
    }

    pub async fn update<I, V>(
        &self,
        where_clause: &str,
        fields: &Fields,
        args: I,
    ) -> Result<PgQueryResult>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.update_statement(where_clause, fields, args)?
            .execute(&self.pool)
            .await
    }

    pub async fn delete<I, V>(&self, where_clause: &str, args: I) -> Result<PgQueryResult>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.delete_statement(where_clause, args)?
            .execute(&self.pool)
            .await
    }

    /// `CREATE INDEX "idx_<table>_<column>" ON t ("column")`
    pub fn create_index_statement(&self, column: &str) -> Result<Statement> {
        validate_identifier(column).map_err(OrmError::Validation)?;
        let index_name = format!("idx_{}_{}", self.name.replace('.', "_"), column);
        let sql = format!(
            "CREATE INDEX {} ON {} ({})",
            quote_identifier(&index_name),
            quote_qualified(&self.name),
            quote_identifier(column)
        );
        Ok(Statement::new(sql, Vec::new()))
    }

    pub async fn create_index(&self, column: &str) -> Result<()> {
        self.create_index_statement(column)?
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether the table is visible on the connection's search path
    pub async fn exists(&self) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT to_regclass($1::text) IS NOT NULL")
            .bind(quote_qualified(&self.name))
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

fn collect_args<I, V>(args: I) -> Vec<Value>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    args.into_iter().map(Into::into).collect()
}

fn column_list(columns: &[&str]) -> Result<String> {
    if columns.is_empty() || columns == ["*"] {
        return Ok("*".to_string());
    }
    columns
        .iter()
        .map(|column| {
            validate_identifier(column).map_err(OrmError::Validation)?;
            Ok(quote_identifier(column))
        })
        .collect::<Result<Vec<_>>>()
        .map(|quoted| quoted.join(", "))
}

fn require_where(where_clause: &str, operation: &str) -> Result<()> {
    if where_clause.trim().is_empty() {
        return Err(OrmError::validation(format!(
            "{} requires a WHERE clause",
            operation
        )));
    }
    Ok(())
}
