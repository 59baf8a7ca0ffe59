//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dialect::{DEFAULT_AGGREGATE_FUNC, DEFAULT_CHECKSUM_FUNC, DEFAULT_NULL_TEMPLATE, DEFAULT_SEP};

/// Default maximum textual key length.
pub const DEFAULT_KEYLEN: u32 = 255;
/// Default primary key column.
pub const DEFAULT_KEY: &str = "id";

/// Root configuration: the two sides plus comparison options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Left (reference) side.
    pub left: SideConfig,

    /// Right side. Every missing field falls back to the left side.
    #[serde(default)]
    pub right: SideConfig,

    /// Comparison behavior.
    #[serde(default)]
    pub options: CompareOptions,
}

/// One side of the comparison, declaratively.
///
/// All fields are optional so the right side can be expressed as a delta
/// against the left; [`CompareConfig::validate`](super::CompareConfig::validate)
/// resolves the fallbacks before anything connects.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SideConfig {
    /// Database host.
    #[serde(default)]
    pub host: Option<String>,

    /// Database port (default: 3306).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name.
    #[serde(default)]
    pub database: Option<String>,

    /// Username.
    #[serde(default)]
    pub user: Option<String>,

    /// Password.
    #[serde(default)]
    pub password: Option<String>,

    /// Table to compare (may be schema-qualified).
    #[serde(default)]
    pub table: Option<String>,

    /// Primary key columns, in order.
    #[serde(default)]
    pub keys: Option<Vec<String>>,

    /// Data columns to compare, in order.
    #[serde(default)]
    pub cols: Option<Vec<String>>,

    /// Maximum storable length of the textual key.
    #[serde(default)]
    pub keylen: Option<u32>,
}

impl fmt::Debug for SideConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("table", &self.table)
            .field("keys", &self.keys)
            .field("cols", &self.cols)
            .field("keylen", &self.keylen)
            .finish()
    }
}

fn default_factor() -> u32 {
    7
}

fn default_max_report() -> u32 {
    32
}

fn default_sep() -> String {
    DEFAULT_SEP.to_string()
}

fn default_prefix() -> String {
    "cmp".to_string()
}

fn default_null() -> String {
    DEFAULT_NULL_TEMPLATE.to_string()
}

fn default_checksum() -> String {
    DEFAULT_CHECKSUM_FUNC.to_string()
}

fn default_aggregate() -> String {
    DEFAULT_AGGREGATE_FUNC.to_string()
}

fn default_true() -> bool {
    true
}

/// Comparison behavior knobs. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Folding factor: each summary level groups `2^factor` buckets of the
    /// level below. Clamped to 1..=30.
    #[serde(default = "default_factor")]
    pub factor: u32,

    /// Cap on the number of cascade levels; 0 means no cap.
    #[serde(default)]
    pub max_levels: usize,

    /// Maximum differing groups carried between adjacent levels before the
    /// walk aborts; 0 disables the check.
    #[serde(default = "default_max_report")]
    pub max_report: u32,

    /// Separator used when composing multi-column keys.
    #[serde(default = "default_sep")]
    pub sep: String,

    /// Optional boolean predicate applied to both source tables when
    /// building level 0 (partial comparison).
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,

    /// Name prefix for intermediate tables.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Template wrapping each column reference to handle NULL.
    #[serde(default = "default_null", rename = "null")]
    pub null_template: String,

    /// Template producing one string from a comma-joined expression list.
    /// Defaults to `CONCAT_WS('<sep>',%s)` built from `sep`.
    #[serde(default, rename = "concat", skip_serializing_if = "Option::is_none")]
    pub concat_template: Option<String>,

    /// Scalar SQL function mapping a string to an unsigned 32-bit integer.
    #[serde(default = "default_checksum", rename = "checksum")]
    pub checksum_func: String,

    /// Aggregate SQL function XOR-folding many checksums into one.
    #[serde(default = "default_aggregate", rename = "aggregate")]
    pub aggregate_func: String,

    /// Create intermediate tables as session-scoped temporaries.
    #[serde(default = "default_true")]
    pub temporary: bool,

    /// Drop intermediate tables after processing.
    /// Defaults to the opposite of `temporary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<bool>,

    /// Process the two sides concurrently.
    #[serde(default)]
    pub parallel: bool,

    /// If nonzero, substitute this for the level-0 `COUNT(*)` probe.
    #[serde(default)]
    pub num_records: u64,

    /// Log the run summary at info level once processing completes.
    #[serde(default)]
    pub stats: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            factor: default_factor(),
            max_levels: 0,
            max_report: default_max_report(),
            sep: default_sep(),
            where_clause: None,
            prefix: default_prefix(),
            null_template: default_null(),
            concat_template: None,
            checksum_func: default_checksum(),
            aggregate_func: default_aggregate(),
            temporary: true,
            cleanup: None,
            parallel: false,
            num_records: 0,
            stats: false,
        }
    }
}
