//! Error types for the comparison library.

use thiserror::Error;

/// Main error type for comparison operations.
#[derive(Error, Debug)]
pub enum CompareError {
    /// Configuration error (missing fields, bad templates, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Both tables are empty; there is nothing to compare.
    ///
    /// This is a distinct condition rather than a failure so callers can
    /// treat it as "no work".
    #[error("Nothing to compare: both tables are empty")]
    EmptyTables,

    /// The investigation set outgrew `max_report` while descending.
    #[error("Effort exceeded at level {level}: {found} differing groups (max_report = {limit})")]
    EffortExceeded {
        /// Cascade level under examination when the guard tripped.
        level: usize,
        /// Size of the investigation set at that level.
        found: usize,
        /// The configured `max_report` bound.
        limit: u32,
    },

    /// Underlying database error with the statement context it occurred in.
    #[error("Query failed: {context}")]
    Query {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// The merge reached a state that should be unreachable.
    #[error("Internal invariant violated: {0}")]
    Internal(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompareError {
    /// Create a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        CompareError::Config(message.into())
    }

    /// Create a Query error with the statement or phase it occurred in.
    pub fn query(source: sqlx::Error, context: impl Into<String>) -> Self {
        CompareError::Query {
            context: context.into(),
            source,
        }
    }

    /// Create an Internal invariant error.
    pub fn internal(message: impl Into<String>) -> Self {
        CompareError::Internal(message.into())
    }
}

/// Result type alias for comparison operations.
pub type Result<T> = std::result::Result<T, CompareError>;
