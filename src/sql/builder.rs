//! Fluent SELECT builder
//!
//! [`QueryBuilder`] only accumulates state; nothing touches the database
//! until it is consumed by [`QueryBuilder::build`] or one of the execution
//! methods. Condition statements are SQL templates written with Postgres
//! `$n` placeholders and the arguments are collected in condition order.
//!
//! ```
//! use runtara_orm::sql::QueryBuilder;
//!
//! let statement = QueryBuilder::new("users")
//!     .select(["id", "name"])
//!     .filter("age > $1", [18])
//!     .order("name ASC")
//!     .limit(10)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(
//!     statement.sql(),
//!     "SELECT id, name FROM users WHERE (age > $1) ORDER BY name ASC LIMIT 10"
//! );
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use sqlx::postgres::PgQueryResult;
use sqlx::{Executor, Postgres};

use crate::error::{OrmError, Result};
use crate::materialize::Rows;
use crate::pagination::Pagination;
use crate::sql::sanitize::{validate_field, validate_order_clause, validate_reference};
use crate::value::{Value, bind_all};

/// Boolean operator joining the conditions of one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoolOp {
    #[default]
    And,
    Or,
}

impl fmt::Display for BoolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BoolOp::And => "AND",
            BoolOp::Or => "OR",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        })
    }
}

/// A predicate template and the arguments for its placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    statement: String,
    args: Vec<Value>,
}

impl Condition {
    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

/// Conditions combined with a single operator, rendered as one `WHERE (...)`
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    op: BoolOp,
    conditions: Vec<Condition>,
}

impl Group {
    pub fn op(&self) -> BoolOp {
        self.op
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    kind: JoinKind,
    table: String,
    on: String,
}

/// Rendered SQL plus its positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    args: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.args)
    }

    /// Run the statement and collect its rows
    pub async fn query<'c, E>(&self, executor: E) -> Result<Rows>
    where
        E: Executor<'c, Database = Postgres>,
    {
        tracing::debug!(sql = %self.sql, args = self.args.len(), "executing query");
        let rows = bind_all(sqlx::query(&self.sql), &self.args)
            .fetch_all(executor)
            .await?;
        Ok(Rows::from(rows))
    }

    /// Run the statement without reading rows
    pub async fn execute<'c, E>(&self, executor: E) -> Result<PgQueryResult>
    where
        E: Executor<'c, Database = Postgres>,
    {
        tracing::debug!(sql = %self.sql, args = self.args.len(), "executing statement");
        Ok(bind_all(sqlx::query(&self.sql), &self.args)
            .execute(executor)
            .await?)
    }

    /// Run the statement and materialize the first row
    pub async fn fetch_one<'c, T, E>(&self, executor: E) -> Result<T>
    where
        T: DeserializeOwned,
        E: Executor<'c, Database = Postgres>,
    {
        self.query(executor).await?.one()
    }

    /// Run the statement and materialize every row
    pub async fn fetch_all<'c, T, E>(&self, executor: E) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        E: Executor<'c, Database = Postgres>,
    {
        self.query(executor).await?.all()
    }
}

/// Accumulates the parts of a SELECT statement
///
/// Table names, selected fields, `group_by` fields and `order` clauses are
/// checked when they are added; the first rejected value is reported by
/// [`build`](Self::build). Condition statements, join predicates and
/// sub-queries are trusted SQL and must carry values through arguments.
#[derive(Debug)]
pub struct QueryBuilder {
    table: String,
    fields: Vec<String>,
    sub_queries: Vec<String>,
    groups: Vec<Group>,
    joins: Vec<Join>,
    group_by: Vec<String>,
    order: Option<String>,
    limit: u64,
    offset: u64,
    error: Option<OrmError>,
}

impl QueryBuilder {
    /// Start a query against `table` (`users`, `public.users`, `users u`)
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        let mut builder = Self {
            table: String::new(),
            fields: Vec::new(),
            sub_queries: Vec::new(),
            groups: Vec::new(),
            joins: Vec::new(),
            group_by: Vec::new(),
            order: None,
            limit: 0,
            offset: 0,
            error: None,
        };
        builder.check(validate_reference(&table));
        builder.table = table;
        builder
    }

    /// Add selected columns; an empty selection renders `*`
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            self.check(validate_field(&field));
            self.fields.push(field);
        }
        self
    }

    /// Add a selected expression verbatim (`COUNT(*) AS total`)
    pub fn select_raw(mut self, expression: impl Into<String>) -> Self {
        self.fields.push(expression.into());
        self
    }

    /// Replace the generated SELECT with hand-written SQL
    ///
    /// Once any sub-query is added, `build` concatenates the sub-queries
    /// and ignores every other setting, including arguments.
    pub fn subquery(mut self, sql: impl Into<String>) -> Self {
        self.sub_queries.push(sql.into());
        self
    }

    /// Add a condition to the current group, opening an `AND` group if none exists
    pub fn filter<I, V>(mut self, statement: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let condition = Condition {
            statement: statement.into(),
            args: args.into_iter().map(Into::into).collect(),
        };
        match self.groups.last_mut() {
            Some(group) => group.conditions.push(condition),
            None => self.groups.push(Group {
                op: BoolOp::And,
                conditions: vec![condition],
            }),
        }
        self
    }

    /// Add a condition without arguments
    pub fn filter_raw(self, statement: impl Into<String>) -> Self {
        self.filter(statement, Vec::<Value>::new())
    }

    /// Open a new group; following `filter` calls land in it
    pub fn group(mut self, op: BoolOp) -> Self {
        self.groups.push(Group {
            op,
            conditions: Vec::new(),
        });
        self
    }

    pub fn join(mut self, kind: JoinKind, table: impl Into<String>, on: impl Into<String>) -> Self {
        let table = table.into();
        self.check(validate_reference(&table));
        self.joins.push(Join {
            kind,
            table,
            on: on.into(),
        });
        self
    }

    /// Set the GROUP BY columns, replacing earlier ones
    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.clear();
        for field in fields {
            let field = field.into();
            self.check(validate_reference(&field));
            self.group_by.push(field);
        }
        self
    }

    /// Set the ORDER BY clause (`"name ASC, id DESC"`)
    pub fn order(mut self, clause: impl Into<String>) -> Self {
        let clause = clause.into();
        self.check(validate_order_clause(&clause));
        self.order = Some(clause);
        self
    }

    /// Maximum rows; 0 means no LIMIT
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Rows to skip; 0 means no OFFSET
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn paginate(self, pagination: &Pagination) -> Self {
        self.limit(pagination.limit()).offset(pagination.offset())
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Render the statement
    ///
    /// Every non-empty group becomes its own ` WHERE (...)` clause, in the
    /// order the groups were opened.
    pub fn build(self) -> Result<Statement> {
        if !self.sub_queries.is_empty() {
            return Ok(Statement::new(self.sub_queries.join(" "), Vec::new()));
        }

        if let Some(err) = self.error {
            return Err(err);
        }

        let fields = if self.fields.is_empty() {
            "*".to_string()
        } else {
            self.fields.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", fields, self.table);
        let mut args = Vec::new();

        for join in &self.joins {
            sql.push_str(&format!(" {} JOIN {} ON {}", join.kind, join.table, join.on));
        }

        for group in self.groups {
            if group.conditions.is_empty() {
                continue;
            }
            let separator = format!(" {} ", group.op);
            let mut statements = Vec::with_capacity(group.conditions.len());
            for condition in group.conditions {
                statements.push(condition.statement);
                args.extend(condition.args);
            }
            sql.push_str(&format!(" WHERE ({})", statements.join(&separator)));
        }

        if !self.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.group_by.join(", ")));
        }

        if let Some(order) = &self.order {
            sql.push_str(&format!(" ORDER BY {}", order));
        }

        if self.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", self.limit));
        }

        if self.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", self.offset));
        }

        Ok(Statement::new(sql, args))
    }

    /// Build and run the query, returning its rows
    pub async fn query<'c, E>(self, executor: E) -> Result<Rows>
    where
        E: Executor<'c, Database = Postgres>,
    {
        self.build()?.query(executor).await
    }

    /// Build, run and materialize the first row; no rows is [`OrmError::NotFound`]
    pub async fn fetch_one<'c, T, E>(self, executor: E) -> Result<T>
    where
        T: DeserializeOwned,
        E: Executor<'c, Database = Postgres>,
    {
        self.build()?.fetch_one(executor).await
    }

    /// Build, run and materialize every row
    pub async fn fetch_all<'c, T, E>(self, executor: E) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        E: Executor<'c, Database = Postgres>,
    {
        self.build()?.fetch_all(executor).await
    }

    fn check(&mut self, result: std::result::Result<(), String>) {
        if let Err(msg) = result {
            self.error.get_or_insert(OrmError::Validation(msg));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(builder: QueryBuilder) -> (String, Vec<Value>) {
        builder.build().expect("query should build").into_parts()
    }

    // =========================================================================
    // Group Accumulation Tests
    // =========================================================================

    #[test]
    fn test_filters_accumulate_into_one_implicit_and_group() {
        let builder = QueryBuilder::new("users")
            .filter("a = $1", [1])
            .filter("b = $2", [2])
            .filter_raw("c IS NULL");

        assert_eq!(builder.groups().len(), 1);
        assert_eq!(builder.groups()[0].op(), BoolOp::And);
        assert_eq!(builder.groups()[0].conditions().len(), 3);
        assert_eq!(builder.groups()[0].conditions()[1].statement(), "b = $2");
        assert_eq!(builder.groups()[0].conditions()[1].args(), &[Value::Integer(2)]);
    }

    #[test]
    fn test_group_opens_new_target() {
        let builder = QueryBuilder::new("users")
            .filter_raw("a")
            .group(BoolOp::Or)
            .filter_raw("b")
            .filter_raw("c");

        assert_eq!(builder.groups().len(), 2);
        assert_eq!(builder.groups()[1].op(), BoolOp::Or);
        assert_eq!(builder.groups()[1].conditions().len(), 2);
    }

    #[test]
    fn test_each_group_renders_its_own_where() {
        let (sql, _) = render(
            QueryBuilder::new("t")
                .filter_raw("A")
                .filter_raw("B")
                .group(BoolOp::Or)
                .filter_raw("C"),
        );
        assert_eq!(sql, "SELECT * FROM t WHERE (A AND B) WHERE (C)");
    }

    #[test]
    fn test_or_group_joins_with_or() {
        let (sql, args) = render(
            QueryBuilder::new("t")
                .group(BoolOp::Or)
                .filter("x = $1", [1])
                .filter("y = $2", ["two"]),
        );
        assert_eq!(sql, "SELECT * FROM t WHERE (x = $1 OR y = $2)");
        assert_eq!(args, vec![Value::Integer(1), Value::Text("two".to_string())]);
    }

    #[test]
    fn test_empty_group_is_skipped() {
        let (sql, _) = render(
            QueryBuilder::new("t")
                .group(BoolOp::Or)
                .filter_raw("a")
                .group(BoolOp::And),
        );
        assert_eq!(sql, "SELECT * FROM t WHERE (a)");
    }

    // =========================================================================
    // Rendering Tests
    // =========================================================================

    #[test]
    fn test_select_where_order_limit() {
        let (sql, args) = render(
            QueryBuilder::new("users")
                .select(["id", "name"])
                .filter("age > $1", [18])
                .order("name ASC")
                .limit(10),
        );
        assert_eq!(
            sql,
            "SELECT id, name FROM users WHERE (age > $1) ORDER BY name ASC LIMIT 10"
        );
        assert_eq!(args, vec![Value::Integer(18)]);
    }

    #[test]
    fn test_joins_render_in_insertion_order() {
        let (sql, _) = render(
            QueryBuilder::new("users u")
                .select(["u.id", "o.total"])
                .join(JoinKind::Inner, "orders o", "o.user_id = u.id")
                .join(JoinKind::Left, "refunds r", "r.order_id = o.id"),
        );
        assert_eq!(
            sql,
            "SELECT u.id, o.total FROM users u INNER JOIN orders o ON o.user_id = u.id LEFT JOIN refunds r ON r.order_id = o.id"
        );
    }

    #[test]
    fn test_group_by_renders_before_order() {
        let (sql, _) = render(
            QueryBuilder::new("orders")
                .select(["user_id"])
                .select_raw("SUM(total) AS spent")
                .group_by(["user_id"])
                .order("user_id"),
        );
        assert_eq!(
            sql,
            "SELECT user_id, SUM(total) AS spent FROM orders GROUP BY user_id ORDER BY user_id"
        );
    }

    #[test]
    fn test_group_by_replaces() {
        let (sql, _) = render(QueryBuilder::new("t").group_by(["a"]).group_by(["b", "c"]));
        assert_eq!(sql, "SELECT * FROM t GROUP BY b, c");
    }

    #[test]
    fn test_offset_and_zero_limits() {
        let (sql, _) = render(QueryBuilder::new("t").limit(0).offset(0));
        assert_eq!(sql, "SELECT * FROM t");

        let (sql, _) = render(QueryBuilder::new("t").limit(5).offset(15));
        assert_eq!(sql, "SELECT * FROM t LIMIT 5 OFFSET 15");
    }

    #[test]
    fn test_paginate() {
        let (sql, _) = render(QueryBuilder::new("t").paginate(&Pagination::new(3, 20)));
        assert_eq!(sql, "SELECT * FROM t LIMIT 20 OFFSET 40");
    }

    #[test]
    fn test_paginate_zero_page_size_keeps_limit() {
        let (sql, _) = render(QueryBuilder::new("t").paginate(&Pagination::new(1, 0)));
        assert_eq!(sql, "SELECT * FROM t LIMIT 1");
    }

    #[test]
    fn test_args_follow_condition_order_across_groups() {
        let (_, args) = render(
            QueryBuilder::new("t")
                .filter("a = $1 AND b = $2", [Value::from(1), Value::from("x")])
                .group(BoolOp::Or)
                .filter("c = $3", [true]),
        );
        assert_eq!(
            args,
            vec![
                Value::Integer(1),
                Value::Text("x".to_string()),
                Value::Bool(true)
            ]
        );
    }

    // =========================================================================
    // Sub-query Override Tests
    // =========================================================================

    #[test]
    fn test_subquery_overrides_everything() {
        let (sql, args) = render(
            QueryBuilder::new("users")
                .select(["id"])
                .filter("age > $1", [18])
                .limit(3)
                .subquery("SELECT 1")
                .subquery("UNION SELECT 2"),
        );
        assert_eq!(sql, "SELECT 1 UNION SELECT 2");
        assert!(args.is_empty());
    }

    // =========================================================================
    // Validation Tests
    // =========================================================================

    #[test]
    fn test_invalid_table_rejected() {
        let result = QueryBuilder::new("users; DROP TABLE users").build();
        assert!(matches!(result, Err(OrmError::Validation(_))));
    }

    #[test]
    fn test_invalid_field_rejected() {
        let result = QueryBuilder::new("users").select(["id", "name FROM x --"]).build();
        assert!(matches!(result, Err(OrmError::Validation(_))));
    }

    #[test]
    fn test_invalid_order_rejected() {
        let result = QueryBuilder::new("users").order("name; DELETE FROM users").build();
        assert!(matches!(result, Err(OrmError::Validation(_))));
    }

    #[test]
    fn test_invalid_join_table_rejected() {
        let result = QueryBuilder::new("users")
            .join(JoinKind::Inner, "(SELECT 1)", "true")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_first_error_is_reported() {
        let err = QueryBuilder::new("users")
            .select(["bad field!"])
            .order("also bad!")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("bad field!"));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(BoolOp::And.to_string(), "AND");
        assert_eq!(BoolOp::Or.to_string(), "OR");
        assert_eq!(JoinKind::Full.to_string(), "FULL");
    }
}
