//! Error types for query parsing and evaluation.

use thiserror::Error;

/// Errors that can occur while parsing or evaluating a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A query object was required but not provided.
    #[error("a query object is required")]
    MissingQuery,

    /// An operator appeared that the whitelist does not allow.
    #[error("operator {0} is not allowed")]
    OperatorNotAllowed(String),

    /// A `$`-prefixed key that is neither a built-in nor a registered
    /// custom operator.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// A reserved filter had the wrong shape.
    #[error("invalid {filter} filter: {reason}")]
    InvalidFilter { filter: String, reason: String },

    /// `$or`/`$and` must carry an array of sub-queries.
    #[error("{0} expects an array of query objects")]
    MalformedLogical(String),

    /// `$regex` or a `$like` variant produced an invalid pattern.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
