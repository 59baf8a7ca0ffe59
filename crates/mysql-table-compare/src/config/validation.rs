//! Validation and resolution of sides and options.
//!
//! Fallbacks are applied once, up front: after resolution each side holds
//! its full set of values and the engine never consults the other side at
//! use time.

use crate::config::types::{CompareOptions, SideConfig, DEFAULT_KEY, DEFAULT_KEYLEN};
use crate::dialect::SqlDialect;
use crate::error::{CompareError, Result};
use crate::mask::clamp_factor;

/// Table-shape fields of one side, before resolution.
#[derive(Debug, Clone, Default)]
pub struct SideFields {
    pub table: Option<String>,
    pub keys: Option<Vec<String>>,
    pub cols: Option<Vec<String>>,
    pub keylen: Option<u32>,
}

impl From<&SideConfig> for SideFields {
    fn from(cfg: &SideConfig) -> Self {
        Self {
            table: cfg.table.clone(),
            keys: cfg.keys.clone(),
            cols: cfg.cols.clone(),
            keylen: cfg.keylen,
        }
    }
}

/// One side with every field resolved.
#[derive(Debug, Clone)]
pub struct ResolvedSide {
    pub table: String,
    pub keys: Vec<String>,
    pub cols: Vec<String>,
    pub keylen: u32,
}

/// Fully resolved connection parameters for one side.
#[derive(Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Comparison options after validation, with derived values filled in.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub factor: u32,
    pub max_levels: usize,
    pub max_report: u32,
    pub where_clause: Option<String>,
    pub prefix: String,
    pub dialect: SqlDialect,
    pub temporary: bool,
    pub cleanup: bool,
    pub parallel: bool,
    pub num_records: u64,
    pub stats: bool,
}

fn require(value: Option<String>, what: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CompareError::config(format!("{} is required", what))),
    }
}

fn check_columns(columns: &[String], what: &str) -> Result<()> {
    if columns.is_empty() {
        return Err(CompareError::config(format!("{} must not be empty", what)));
    }
    if columns.iter().any(|c| c.trim().is_empty()) {
        return Err(CompareError::config(format!(
            "{} must not contain empty names",
            what
        )));
    }
    Ok(())
}

/// Resolve the table shape of both sides, right falling back to left.
pub fn resolve_sides(left: &SideFields, right: &SideFields) -> Result<(ResolvedSide, ResolvedSide)> {
    let left_table = require(left.table.clone(), "left.table")?;
    let right_table = match right.table.clone() {
        Some(t) if !t.trim().is_empty() => t,
        _ => left_table.clone(),
    };

    let left_keys = left
        .keys
        .clone()
        .unwrap_or_else(|| vec![DEFAULT_KEY.to_string()]);
    let right_keys = right.keys.clone().unwrap_or_else(|| left_keys.clone());

    let left_cols = left
        .cols
        .clone()
        .ok_or_else(|| CompareError::config("left.cols is required"))?;
    let right_cols = right.cols.clone().unwrap_or_else(|| left_cols.clone());

    let left_keylen = left.keylen.unwrap_or(DEFAULT_KEYLEN);
    let right_keylen = right.keylen.unwrap_or(left_keylen);

    check_columns(&left_keys, "left.keys")?;
    check_columns(&right_keys, "right.keys")?;
    check_columns(&left_cols, "left.cols")?;
    check_columns(&right_cols, "right.cols")?;

    if left_keys.len() != right_keys.len() {
        return Err(CompareError::config(
            "the two sides must use the same number of key columns",
        ));
    }
    if left_cols.len() != right_cols.len() {
        return Err(CompareError::config(
            "the two sides must compare the same number of data columns",
        ));
    }
    if left_keylen == 0 || right_keylen == 0 {
        return Err(CompareError::config("keylen must be at least 1"));
    }

    Ok((
        ResolvedSide {
            table: left_table,
            keys: left_keys,
            cols: left_cols,
            keylen: left_keylen,
        },
        ResolvedSide {
            table: right_table,
            keys: right_keys,
            cols: right_cols,
            keylen: right_keylen,
        },
    ))
}

/// Resolve connection parameters, right falling back to left.
pub fn resolve_connections(
    left: &SideConfig,
    right: &SideConfig,
) -> Result<(ConnectionParams, ConnectionParams)> {
    let left_params = ConnectionParams {
        host: require(left.host.clone(), "left.host")?,
        port: left.port.unwrap_or(3306),
        database: require(left.database.clone(), "left.database")?,
        user: require(left.user.clone(), "left.user")?,
        password: left.password.clone().unwrap_or_default(),
    };
    let right_params = ConnectionParams {
        host: right.host.clone().unwrap_or_else(|| left_params.host.clone()),
        port: right.port.unwrap_or(left_params.port),
        database: right
            .database
            .clone()
            .unwrap_or_else(|| left_params.database.clone()),
        user: right.user.clone().unwrap_or_else(|| left_params.user.clone()),
        password: right
            .password
            .clone()
            .unwrap_or_else(|| left_params.password.clone()),
    };
    Ok((left_params, right_params))
}

fn check_prefix(prefix: &str) -> Result<()> {
    let ok = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(CompareError::config(format!(
            "prefix {:?} must be a plain identifier",
            prefix
        )))
    }
}

impl CompareOptions {
    /// Validate the options and fill in derived values.
    pub fn resolve(&self) -> Result<ResolvedOptions> {
        check_prefix(&self.prefix)?;

        if self.sep.is_empty() {
            return Err(CompareError::config("sep must not be empty"));
        }
        if self.sep.contains('\'') {
            return Err(CompareError::config("sep must not contain a single quote"));
        }

        let concat = match &self.concat_template {
            Some(template) => template.clone(),
            None => format!("CONCAT_WS('{}',%s)", self.sep),
        };

        let dialect = SqlDialect::new(
            &self.null_template,
            &concat,
            &self.checksum_func,
            &self.aggregate_func,
        )?;

        Ok(ResolvedOptions {
            factor: clamp_factor(self.factor),
            max_levels: self.max_levels,
            max_report: self.max_report,
            where_clause: self.where_clause.clone(),
            prefix: self.prefix.clone(),
            dialect,
            temporary: self.temporary,
            cleanup: self.cleanup.unwrap_or(!self.temporary),
            parallel: self.parallel,
            num_records: self.num_records,
            stats: self.stats,
        })
    }
}
