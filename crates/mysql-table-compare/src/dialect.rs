//! SQL dialect adapter (Strategy pattern).
//!
//! The comparison engine never hard-codes server syntax: every piece of SQL
//! that depends on the flavor of the server goes through [`SqlDialect`],
//! which holds the NULL-coalescing and concatenation templates plus the
//! scalar checksum and XOR-style aggregate function names. The defaults
//! target MySQL/MariaDB (`COALESCE`, `CONCAT_WS`, `CRC32`, `BIT_XOR`).
//!
//! Templates are substituted lexically. Their values are operator-provided
//! configuration, never row data, so quoting is the operator's concern.

use std::fmt;

use crate::error::{CompareError, Result};

/// A printf-style SQL fragment with exactly one `%s` substitution point.
#[derive(Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
}

impl Template {
    /// Parse a template, rejecting anything without exactly one `%s`.
    ///
    /// `name` identifies the option in error messages.
    pub fn parse(text: impl Into<String>, name: &str) -> Result<Self> {
        let text = text.into();
        let holes = text.matches("%s").count();
        if holes != 1 {
            return Err(CompareError::config(format!(
                "template '{}' must contain exactly one %s, found {} in {:?}",
                name, holes, text
            )));
        }
        Ok(Self { text })
    }

    /// Substitute the single `%s` with `arg`.
    pub fn render(&self, arg: &str) -> String {
        self.text.replacen("%s", arg, 1)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Template").field(&self.text).finish()
    }
}

/// Default NULL-coalescing template.
pub const DEFAULT_NULL_TEMPLATE: &str = "COALESCE(%s,'null')";
/// Default scalar checksum function.
pub const DEFAULT_CHECKSUM_FUNC: &str = "CRC32";
/// Default XOR-style aggregate function.
pub const DEFAULT_AGGREGATE_FUNC: &str = "BIT_XOR";
/// Default key separator.
pub const DEFAULT_SEP: &str = ":";

/// SQL syntax strategy for the comparison queries.
#[derive(Debug, Clone)]
pub struct SqlDialect {
    null: Template,
    concat: Template,
    checksum: String,
    aggregate: String,
}

impl SqlDialect {
    /// Build a dialect from raw option strings, validating the templates.
    pub fn new(null: &str, concat: &str, checksum: &str, aggregate: &str) -> Result<Self> {
        if checksum.trim().is_empty() {
            return Err(CompareError::config("checksum function must not be empty"));
        }
        if aggregate.trim().is_empty() {
            return Err(CompareError::config("aggregate function must not be empty"));
        }
        Ok(Self {
            null: Template::parse(null, "null")?,
            concat: Template::parse(concat, "concat")?,
            checksum: checksum.to_string(),
            aggregate: aggregate.to_string(),
        })
    }

    /// The MySQL/MariaDB default dialect.
    pub fn mysql() -> Self {
        Self {
            null: Template {
                text: DEFAULT_NULL_TEMPLATE.to_string(),
            },
            concat: Template {
                text: format!("CONCAT_WS('{}',%s)", DEFAULT_SEP),
            },
            checksum: DEFAULT_CHECKSUM_FUNC.to_string(),
            aggregate: DEFAULT_AGGREGATE_FUNC.to_string(),
        }
    }

    /// A single column reference wrapped so NULL maps to a sentinel string.
    pub fn coalesced(&self, col: &str) -> String {
        self.null.render(col)
    }

    /// One SQL expression producing the textual composite key.
    pub fn concat_key(&self, keys: &[String]) -> String {
        self.concat_columns(keys.iter())
    }

    /// One SQL expression over the keys followed by the data columns.
    ///
    /// The key always participates so that swapping two rows' values still
    /// changes both row checksums.
    pub fn concat_all(&self, keys: &[String], cols: &[String]) -> String {
        self.concat_columns(keys.iter().chain(cols.iter()))
    }

    fn concat_columns<'a>(&self, cols: impl Iterator<Item = &'a String>) -> String {
        let coalesced: Vec<String> = cols.map(|c| self.coalesced(c)).collect();
        self.concat.render(&coalesced.join(","))
    }

    /// Apply the scalar checksum function to an expression.
    pub fn checksum_of(&self, expr: &str) -> String {
        format!("{}({})", self.checksum, expr)
    }

    /// Apply the XOR-style aggregate to an expression.
    pub fn aggregate_of(&self, expr: &str) -> String {
        format!("{}({})", self.aggregate, expr)
    }

    /// The `TEMPORARY ` keyword, or nothing.
    pub fn temporary_keyword(temporary: bool) -> &'static str {
        if temporary {
            "TEMPORARY "
        } else {
            ""
        }
    }
}
