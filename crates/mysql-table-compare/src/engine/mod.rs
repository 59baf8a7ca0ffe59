//! Comparison engine: lifecycle, cascade builds, and bulk resolution.
//!
//! [`Comparator`] ties the pieces together. One `process` call:
//!
//! 1. acquires a dedicated session per side (temporary tables are
//!    session-scoped, and the two sides must never share a session),
//! 2. builds the level-0 checksum tables and probes their row counts,
//! 3. builds the summary cascades over the shared mask vector,
//! 4. walks the cascades top-down, streaming leaf differences to the
//!    caller's callback,
//! 5. resolves deferred bulk chunks into concrete keys, and
//! 6. drops every intermediate table it created, when cleanup is on.
//!
//! With `parallel` enabled the two sides overlap at every per-side phase;
//! the first failure cancels the other side's in-flight work, and cleanup
//! still runs before the error surfaces.

pub mod types;
pub mod walker;

pub use types::{BulkChunk, Change, ChangeType, CompareSummary, LevelRow, WalkOutcome};
pub use walker::LevelSource;

use std::io::Write;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::mysql::MySql;
use sqlx::pool::PoolConnection;
use sqlx::{MySqlPool, Row};
use tracing::{debug, info};

use crate::config::validation::{resolve_sides, SideFields};
use crate::config::{CompareConfig, CompareOptions, ResolvedOptions, ResolvedSide};
use crate::error::{CompareError, Result};
use crate::mask::fold_masks;
use crate::query;

/// Side index of the left (reference) table in intermediate table names.
const LEFT_SIDE: u8 = 1;
/// Side index of the right table in intermediate table names.
const RIGHT_SIDE: u8 = 2;

/// One side of a comparison: a caller-owned pool plus the table shape.
///
/// Fields left unset on the right side are resolved from the left when the
/// [`Comparator`] is constructed; `keys` ultimately defaults to `["id"]`
/// and `keylen` to 255.
#[derive(Debug, Clone)]
pub struct TableRef {
    pool: MySqlPool,
    table: Option<String>,
    keys: Option<Vec<String>>,
    cols: Option<Vec<String>>,
    keylen: Option<u32>,
}

impl TableRef {
    /// Wrap a connection pool. The pool stays owned by the caller; the
    /// engine only borrows sessions from it.
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            table: None,
            keys: None,
            cols: None,
            keylen: None,
        }
    }

    /// Set the table to compare (may be schema-qualified).
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Set the ordered primary key columns.
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Set the ordered data columns to compare.
    pub fn with_cols<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cols = Some(cols.into_iter().map(Into::into).collect());
        self
    }

    /// Set the maximum storable length of the textual key.
    pub fn with_keylen(mut self, keylen: u32) -> Self {
        self.keylen = Some(keylen);
        self
    }

    fn fields(&self) -> SideFields {
        SideFields {
            table: self.table.clone(),
            keys: self.keys.clone(),
            cols: self.cols.clone(),
            keylen: self.keylen,
        }
    }
}

/// Remote table comparator.
///
/// Detects row-level differences between two tables with minimal network
/// traffic by building checksum cascades on both servers and descending
/// only into subtrees whose folded checksums disagree.
#[derive(Debug)]
pub struct Comparator {
    left_pool: MySqlPool,
    right_pool: MySqlPool,
    left: ResolvedSide,
    right: ResolvedSide,
    opts: ResolvedOptions,
}

impl Comparator {
    /// Build a comparator, resolving side fallbacks and validating the
    /// options before any SQL runs.
    pub fn new(left: TableRef, right: TableRef, options: CompareOptions) -> Result<Self> {
        let opts = options.resolve()?;
        let (left_side, right_side) = resolve_sides(&left.fields(), &right.fields())?;
        Ok(Self {
            left_pool: left.pool,
            right_pool: right.pool,
            left: left_side,
            right: right_side,
            opts,
        })
    }

    /// Build a comparator from a declarative config, connecting both sides.
    pub async fn from_config(config: &CompareConfig) -> Result<Self> {
        let (left_params, right_params) =
            crate::config::validation::resolve_connections(&config.left, &config.right)?;
        let left_pool = left_params.connect().await?;
        let right_pool = right_params.connect().await?;

        let left = TableRef {
            pool: left_pool,
            table: config.left.table.clone(),
            keys: config.left.keys.clone(),
            cols: config.left.cols.clone(),
            keylen: config.left.keylen,
        };
        let right = TableRef {
            pool: right_pool,
            table: config.right.table.clone(),
            keys: config.right.keys.clone(),
            cols: config.right.cols.clone(),
            keylen: config.right.keylen,
        };

        Self::new(left, right, config.options.clone())
    }

    /// Run the comparison, streaming each difference to `on_change`.
    ///
    /// The callback runs on the caller's task: leaf differences arrive in
    /// merge order (ascending `idc`, then `cks`), followed by bulk-resolved
    /// inserts and then deletes, each ascending by key. Returns only once
    /// walking and bulk resolution are complete.
    pub async fn process<F>(&self, mut on_change: F) -> Result<CompareSummary>
    where
        F: FnMut(&Change) + Send,
    {
        let started_at = Utc::now();
        info!(
            "Starting comparison of {} (left) vs {} (right)",
            self.left.table, self.right.table
        );

        let mut left = SideSession::acquire(&self.left_pool, LEFT_SIDE, &self.left, &self.opts)
            .await?;
        let mut right =
            SideSession::acquire(&self.right_pool, RIGHT_SIDE, &self.right, &self.opts).await?;

        let outcome = self.run(&mut left, &mut right, &mut on_change).await;

        // Cleanup runs on success and on every abort path alike; drop
        // errors are logged and swallowed.
        left.finish(&self.opts).await;
        right.finish(&self.opts).await;

        let core = outcome?;
        let summary = CompareSummary {
            left_rows: core.left_rows,
            right_rows: core.right_rows,
            factor: self.opts.factor,
            levels: core.levels,
            inserts: core.inserts,
            updates: core.updates,
            deletes: core.deletes,
            checksum_ms: core.checksum_ms,
            summary_ms: core.summary_ms,
            walk_ms: core.walk_ms,
            bulk_ms: core.bulk_ms,
            started_at,
            completed_at: Utc::now(),
        };

        if self.opts.stats {
            summary.log();
        }

        Ok(summary)
    }

    /// Run the comparison without a callback, writing each difference to
    /// standard output as a `"<type> <key>"` line.
    pub async fn process_to_stdout(&self) -> Result<CompareSummary> {
        let stdout = std::io::stdout();
        self.process(|change| {
            let mut lock = stdout.lock();
            let _ = writeln!(lock, "{} {}", change.kind, change.key);
        })
        .await
    }

    async fn run(
        &self,
        left: &mut SideSession,
        right: &mut SideSession,
        emit: &mut (dyn FnMut(&Change) + Send),
    ) -> Result<CoreStats> {
        let opts = &self.opts;

        // Phase 1: level-0 checksum tables plus row counts.
        let phase = Instant::now();
        let (left_rows, right_rows) = if opts.parallel {
            tokio::try_join!(left.build_checksum_table(opts), right.build_checksum_table(opts))?
        } else {
            let l = left.build_checksum_table(opts).await?;
            let r = right.build_checksum_table(opts).await?;
            (l, r)
        };
        let checksum_ms = phase.elapsed().as_millis() as u64;

        info!("Level 0 built: {} rows left, {} rows right", left_rows, right_rows);

        let size = left_rows.max(right_rows);
        if size == 0 {
            return Err(CompareError::EmptyTables);
        }

        let masks = fold_masks(size, opts.factor, opts.max_levels);
        debug!("cascade masks (leaf first): {:?}", masks);

        // Phase 2: summary cascades, identical masks on both sides.
        let phase = Instant::now();
        if opts.parallel {
            tokio::try_join!(left.build_summaries(opts, &masks), right.build_summaries(opts, &masks))?;
        } else {
            left.build_summaries(opts, &masks).await?;
            right.build_summaries(opts, &masks).await?;
        }
        let summary_ms = phase.elapsed().as_millis() as u64;

        // Phase 3: descend and classify.
        let phase = Instant::now();
        let walk = walker::walk(left, right, &masks, opts.max_report, opts.parallel, emit).await?;
        let walk_ms = phase.elapsed().as_millis() as u64;

        debug!(
            "walk finished after {} levels: {} updates, {} inserts, {} deletes, \
             {} insert chunks, {} delete chunks",
            walk.levels_walked,
            walk.updates,
            walk.inserts,
            walk.deletes,
            walk.insert_chunks.len(),
            walk.delete_chunks.len()
        );

        // Phase 4: resolve whole-subtree chunks into concrete keys. The two
        // scans may overlap; emission stays on this task, inserts first.
        let phase = Instant::now();
        let (insert_keys, delete_keys) = if opts.parallel {
            tokio::try_join!(
                left.fetch_chunk_keys(&walk.insert_chunks),
                right.fetch_chunk_keys(&walk.delete_chunks)
            )?
        } else {
            (
                left.fetch_chunk_keys(&walk.insert_chunks).await?,
                right.fetch_chunk_keys(&walk.delete_chunks).await?,
            )
        };

        let mut inserts = walk.inserts;
        let mut deletes = walk.deletes;
        for key in insert_keys {
            inserts += 1;
            emit(&Change::new(ChangeType::Insert, key));
        }
        for key in delete_keys {
            deletes += 1;
            emit(&Change::new(ChangeType::Delete, key));
        }
        let bulk_ms = phase.elapsed().as_millis() as u64;

        Ok(CoreStats {
            left_rows,
            right_rows,
            levels: masks.len(),
            inserts,
            updates: walk.updates,
            deletes,
            checksum_ms,
            summary_ms,
            walk_ms,
            bulk_ms,
        })
    }
}

/// Per-phase numbers gathered by `run`, before timestamps are attached.
struct CoreStats {
    left_rows: u64,
    right_rows: u64,
    levels: usize,
    inserts: u64,
    updates: u64,
    deletes: u64,
    checksum_ms: u64,
    summary_ms: u64,
    walk_ms: u64,
    bulk_ms: u64,
}

/// One side's dedicated database session for the duration of a `process`
/// call, plus the bookkeeping needed to drop what it created.
struct SideSession {
    conn: PoolConnection<MySql>,
    side: u8,
    shape: ResolvedSide,
    prefix: String,
    created: Vec<String>,
}

impl SideSession {
    async fn acquire(
        pool: &MySqlPool,
        side: u8,
        spec: &ResolvedSide,
        opts: &ResolvedOptions,
    ) -> Result<Self> {
        let conn = pool.acquire().await.map_err(|e| {
            CompareError::query(e, format!("acquiring session for side {}", side))
        })?;
        Ok(Self {
            conn,
            side,
            shape: spec.clone(),
            prefix: opts.prefix.clone(),
            created: Vec::new(),
        })
    }

    fn level_name(&self, level: usize) -> String {
        query::table_name(&self.prefix, self.side, level)
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        sqlx::query(sql)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| CompareError::query(e, sql.to_string()))?;
        Ok(())
    }

    /// Create the level-0 checksum table and return its row count (or the
    /// configured `num_records` override).
    async fn build_checksum_table(&mut self, opts: &ResolvedOptions) -> Result<u64> {
        let name = self.level_name(0);
        let sql = query::create_checksum_table_sql(
            &opts.dialect,
            &name,
            &self.shape.table,
            &self.shape.keys,
            &self.shape.cols,
            self.shape.keylen,
            opts.where_clause.as_deref(),
            opts.temporary,
        );
        self.execute(&sql).await?;
        self.created.push(name.clone());

        if opts.num_records > 0 {
            return Ok(opts.num_records);
        }

        let count_sql = query::count_sql(&name);
        let row = sqlx::query(&count_sql)
            .fetch_one(&mut *self.conn)
            .await
            .map_err(|e| CompareError::query(e, count_sql.clone()))?;
        let count: i64 = row
            .try_get(0)
            .map_err(|e| CompareError::query(e, format!("decoding count from {}", name)))?;
        Ok(count.max(0) as u64)
    }

    /// Create summary levels 1..L-1, each folding the one below it.
    async fn build_summaries(&mut self, opts: &ResolvedOptions, masks: &[u32]) -> Result<()> {
        for (level, &mask) in masks.iter().enumerate().skip(1) {
            let name = self.level_name(level);
            let prev = self.level_name(level - 1);
            let sql =
                query::create_summary_table_sql(&opts.dialect, &name, &prev, mask, opts.temporary);
            self.execute(&sql).await?;
            self.created.push(name);
        }
        Ok(())
    }

    /// Drop everything this session created, in reverse order, ignoring
    /// individual failures.
    async fn drop_created(&mut self) {
        while let Some(name) = self.created.pop() {
            let sql = query::drop_table_sql(&name);
            if let Err(e) = sqlx::query(&sql).execute(&mut *self.conn).await {
                debug!("cleanup: failed to drop {}: {}", name, e);
            }
        }
    }

    /// End the session: run cleanup when enabled, and close the session
    /// outright when temporary tables are being left behind so they die
    /// with it instead of lingering on a pooled connection.
    async fn finish(mut self, opts: &ResolvedOptions) {
        if opts.cleanup {
            self.drop_created().await;
        } else if opts.temporary && !self.created.is_empty() {
            drop(self.conn.detach());
        }
    }
}

#[async_trait]
impl LevelSource for SideSession {
    async fn fetch_level(
        &mut self,
        level: usize,
        at_leaf: bool,
        parent_mask: u32,
        investigate: &[u32],
    ) -> Result<Vec<LevelRow>> {
        let name = self.level_name(level);
        let sql = query::level_select_sql(&name, at_leaf, parent_mask, investigate);
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| CompareError::query(e, sql.clone()))?;

        // Columns are read positionally, in issued-SELECT order.
        rows.into_iter()
            .map(|row| {
                let idc: u32 = row
                    .try_get(0)
                    .map_err(|e| CompareError::query(e, format!("decoding idc from {}", name)))?;
                let cks: u32 = row
                    .try_get(1)
                    .map_err(|e| CompareError::query(e, format!("decoding cks from {}", name)))?;
                let id = if at_leaf {
                    Some(row.try_get::<String, _>(2).map_err(|e| {
                        CompareError::query(e, format!("decoding id from {}", name))
                    })?)
                } else {
                    None
                };
                Ok(LevelRow { idc, cks, id })
            })
            .collect()
    }

    async fn fetch_chunk_keys(&mut self, chunks: &[BulkChunk]) -> Result<Vec<String>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let name = self.level_name(0);
        let sql = query::bulk_keys_sql(&name, chunks);
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| CompareError::query(e, sql.clone()))?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>(0)
                    .map_err(|e| CompareError::query(e, format!("decoding id from {}", name)))
            })
            .collect()
    }
}
