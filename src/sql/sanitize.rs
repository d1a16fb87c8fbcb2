//! SQL Identifier Sanitization Utilities
//!
//! Table names, column names and ordering clauses are interpolated into SQL
//! text rather than bound, so every one of them passes through this module
//! before it reaches a statement.

use std::sync::LazyLock;

use regex::Regex;

/// PostgreSQL reserved keywords that cannot be used as unquoted identifiers
pub const POSTGRES_RESERVED_WORDS: &[&str] = &[
    "ALL", "ANALYSE", "ANALYZE", "AND", "ANY", "ARRAY", "AS", "ASC", "ASYMMETRIC", "BOTH",
    "CASE", "CAST", "CHECK", "COLLATE", "COLUMN", "CONSTRAINT", "CREATE", "CURRENT_CATALOG",
    "CURRENT_DATE", "CURRENT_ROLE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER",
    "DEFAULT", "DEFERRABLE", "DESC", "DISTINCT", "DO", "ELSE", "END", "EXCEPT", "FALSE",
    "FETCH", "FOR", "FOREIGN", "FROM", "GRANT", "GROUP", "HAVING", "IN", "INITIALLY",
    "INTERSECT", "INTO", "LATERAL", "LEADING", "LIMIT", "LOCALTIME", "LOCALTIMESTAMP", "NOT",
    "NULL", "OFFSET", "ON", "ONLY", "OR", "ORDER", "PLACING", "PRIMARY", "REFERENCES",
    "RETURNING", "SELECT", "SESSION_USER", "SOME", "SYMMETRIC", "TABLE", "THEN", "TO",
    "TRAILING", "TRUE", "UNION", "UNIQUE", "USER", "USING", "VARIADIC", "WHEN", "WHERE",
    "WINDOW", "WITH",
];

/// Longest identifier PostgreSQL keeps without truncation (NAMEDATALEN - 1)
pub const MAX_IDENTIFIER_LEN: usize = 63;

const IDENT: &str = r"[A-Za-z_][A-Za-z0-9_]*";

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^{IDENT}$")).expect("identifier pattern"));

// `name`, `schema.name`, `t.*`, each with an optional `[AS] alias`
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<target>{IDENT}(?:\.(?:{IDENT}|\*))?)(?:\s+(?:(?i:AS)\s+)?(?P<alias>{IDENT}))?$"
    ))
    .expect("reference pattern")
});

static ORDER_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<target>{IDENT}(?:\.{IDENT})?)(?:\s+(?i:ASC|DESC))?(?:\s+(?i:NULLS)\s+(?i:FIRST|LAST))?$"
    ))
    .expect("order pattern")
});

/// Quote a SQL identifier to make it safe for use in queries
///
/// # Example
/// ```
/// use runtara_orm::sql::quote_identifier;
///
/// let quoted = quote_identifier("my_table");
/// assert_eq!(quoted, "\"my_table\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Quote a possibly schema-qualified name part by part
///
/// ```
/// use runtara_orm::sql::quote_qualified;
///
/// assert_eq!(quote_qualified("public.users"), "\"public\".\"users\"");
/// ```
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// Validate a single table or column name
///
/// Rules:
/// - Must start with a letter or underscore
/// - Can only contain ASCII letters, numbers, and underscores
/// - At most 63 bytes
///
/// Reserved words are accepted because callers of this check quote the name.
///
/// # Example
/// ```
/// use runtara_orm::sql::validate_identifier;
///
/// assert!(validate_identifier("created_at").is_ok());
/// assert!(validate_identifier("name; DROP TABLE users").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "Identifier '{}' exceeds {} bytes",
            name, MAX_IDENTIFIER_LEN
        ));
    }

    if !IDENTIFIER_RE.is_match(name) {
        return Err(format!(
            "Identifier '{}' is invalid. Must start with a letter or underscore and contain only letters, numbers, and underscores.",
            name
        ));
    }

    Ok(())
}

/// Validate a possibly schema-qualified name that will be quoted (`users`, `audit.events`)
pub fn validate_qualified(name: &str) -> Result<(), String> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(format!(
            "Name '{}' has too many qualifiers; expected 'name' or 'schema.name'",
            name
        ));
    }
    parts.into_iter().try_for_each(validate_identifier)
}

/// Validate a reference rendered verbatim into SQL
///
/// Accepts `name`, `schema.name`, `alias.column`, `alias.*` and any of those
/// followed by `alias` or `AS alias`. Since the text is not quoted, each
/// name part must also avoid reserved keywords.
///
/// ```
/// use runtara_orm::sql::validate_reference;
///
/// assert!(validate_reference("users").is_ok());
/// assert!(validate_reference("orders AS o").is_ok());
/// assert!(validate_reference("o.*").is_ok());
/// assert!(validate_reference("users; --").is_err());
/// ```
pub fn validate_reference(text: &str) -> Result<(), String> {
    let caps = REFERENCE_RE
        .captures(text.trim())
        .ok_or_else(|| format!("'{}' is not a valid table or column reference", text))?;

    let target = &caps["target"];
    target
        .split('.')
        .filter(|part| *part != "*")
        .try_for_each(check_not_reserved)?;

    if let Some(alias) = caps.name("alias") {
        check_not_reserved(alias.as_str())?;
    }

    Ok(())
}

/// Validate a selected field: `*` or a reference
pub fn validate_field(text: &str) -> Result<(), String> {
    if text.trim() == "*" {
        return Ok(());
    }
    validate_reference(text)
}

/// Validate an ORDER BY clause (without the `ORDER BY` keyword)
///
/// Each comma-separated item is a column reference optionally followed by
/// `ASC`/`DESC` and `NULLS FIRST`/`NULLS LAST`.
///
/// ```
/// use runtara_orm::sql::validate_order_clause;
///
/// assert!(validate_order_clause("name ASC, u.created_at DESC NULLS LAST").is_ok());
/// assert!(validate_order_clause("name; DELETE FROM users").is_err());
/// ```
pub fn validate_order_clause(clause: &str) -> Result<(), String> {
    if clause.trim().is_empty() {
        return Err("Order clause cannot be empty".to_string());
    }

    for item in clause.split(',') {
        let item = item.trim();
        let caps = ORDER_ITEM_RE
            .captures(item)
            .ok_or_else(|| format!("Invalid sort item: '{}'", item))?;
        caps["target"].split('.').try_for_each(check_not_reserved)?;
    }

    Ok(())
}

fn check_not_reserved(name: &str) -> Result<(), String> {
    if POSTGRES_RESERVED_WORDS.contains(&name.to_uppercase().as_str()) {
        return Err(format!(
            "Identifier '{}' is a PostgreSQL reserved keyword and cannot be used unquoted.",
            name
        ));
    }
    Ok(())
}
