//! SQL statement generation for the checksum cascade.
//!
//! Every statement the engine issues is assembled here as plain text so the
//! exact shape can be unit tested. Only operator-controlled configuration
//! (table names, column lists, templates) and engine-computed integers
//! (masks, checksums) are interpolated; row data never reaches SQL text.

use crate::dialect::SqlDialect;
use crate::engine::types::BulkChunk;

/// Name of an intermediate table: `<prefix>_<side>_<level>`.
///
/// Side 1 is the left (reference) table, side 2 the right. These names are
/// observable when cleanup is disabled.
pub fn table_name(prefix: &str, side: u8, level: usize) -> String {
    format!("{}_{}_{}", prefix, side, level)
}

/// `CREATE TABLE ... AS SELECT` for the level-0 checksum table.
///
/// One row per source row: the textual composite key, the key checksum
/// (`idc`) and the full-row checksum (`cks`, key included).
#[allow(clippy::too_many_arguments)]
pub fn create_checksum_table_sql(
    dialect: &SqlDialect,
    name: &str,
    source_table: &str,
    keys: &[String],
    cols: &[String],
    keylen: u32,
    where_clause: Option<&str>,
    temporary: bool,
) -> String {
    let key_expr = dialect.concat_key(keys);
    let all_expr = dialect.concat_all(keys, cols);

    let mut sql = format!(
        "CREATE {tmp}TABLE {name} (\
         id VARCHAR({keylen}) NOT NULL, \
         idc INTEGER UNSIGNED NOT NULL, \
         cks INTEGER UNSIGNED NOT NULL) \
         AS SELECT {key_expr} AS id, {idc} AS idc, {cks} AS cks FROM {source_table}",
        tmp = SqlDialect::temporary_keyword(temporary),
        name = name,
        keylen = keylen,
        key_expr = key_expr,
        idc = dialect.checksum_of(&key_expr),
        cks = dialect.checksum_of(&all_expr),
        source_table = source_table,
    );

    if let Some(pred) = where_clause {
        sql.push_str(&format!(" WHERE {}", pred));
    }

    sql
}

/// `SELECT COUNT(*)` probe for a freshly built table.
pub fn count_sql(name: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", name)
}

/// `CREATE TABLE ... AS SELECT` for one summary level.
///
/// Groups the previous level by `idc & mask` and folds the group checksums
/// with the XOR-style aggregate.
pub fn create_summary_table_sql(
    dialect: &SqlDialect,
    name: &str,
    prev_name: &str,
    mask: u32,
    temporary: bool,
) -> String {
    format!(
        "CREATE {tmp}TABLE {name} (\
         idc INTEGER UNSIGNED NOT NULL, \
         cks INTEGER UNSIGNED NOT NULL) \
         AS SELECT idc & {mask} AS idc, {agg} AS cks \
         FROM {prev_name} GROUP BY idc & {mask}",
        tmp = SqlDialect::temporary_keyword(temporary),
        name = name,
        mask = mask,
        agg = dialect.aggregate_of("cks"),
        prev_name = prev_name,
    )
}

/// Ordered per-level select for the walker.
///
/// The `id` column is projected only at the leaf. The investigation
/// predicate is omitted when the set is empty (the root scans everything).
pub fn level_select_sql(
    name: &str,
    at_leaf: bool,
    parent_mask: u32,
    investigate: &[u32],
) -> String {
    let cols = if at_leaf { "idc, cks, id" } else { "idc, cks" };
    let mut sql = format!("SELECT {} FROM {}", cols, name);

    if !investigate.is_empty() {
        let list = investigate
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" WHERE idc & {} IN ({})", parent_mask, list));
    }

    sql.push_str(" ORDER BY idc, cks");
    sql
}

/// Leaf scan resolving deferred bulk chunks into concrete keys.
pub fn bulk_keys_sql(leaf_name: &str, chunks: &[BulkChunk]) -> String {
    let predicates = chunks
        .iter()
        .map(|c| format!("(idc & {}) = {}", c.mask, c.idc))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!(
        "SELECT id FROM {} WHERE {} ORDER BY id",
        leaf_name, predicates
    )
}

/// Drop one intermediate table, tolerating its absence.
pub fn drop_table_sql(name: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", name)
}
