//! SQL utilities
//!
//! Provides the SELECT builder, the rendered statement type and identifier
//! sanitization.

pub mod builder;
pub mod sanitize;

pub use builder::{BoolOp, Condition, Group, JoinKind, QueryBuilder, Statement};
pub use sanitize::{
    POSTGRES_RESERVED_WORDS, quote_identifier, quote_qualified, validate_identifier,
    validate_order_clause, validate_reference,
};
