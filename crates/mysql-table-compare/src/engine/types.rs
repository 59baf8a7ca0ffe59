//! Type definitions for the comparison engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a single differing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Present on the left side only.
    Insert,
    /// Present on both sides with differing contents.
    Update,
    /// Present on the right side only.
    Delete,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Insert => write!(f, "insert"),
            ChangeType::Update => write!(f, "update"),
            ChangeType::Delete => write!(f, "delete"),
        }
    }
}

/// One emitted difference: a classification plus the textual row key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// What happened to the row.
    pub kind: ChangeType,
    /// The composite key in its textual (separator-joined) form.
    pub key: String,
}

impl Change {
    /// Create a new change record.
    pub fn new(kind: ChangeType, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

/// A whole subtree of the leaf table known to exist on exactly one side.
///
/// `idc & mask` selects every leaf row of the subtree; the bulk resolver
/// turns the pair back into concrete keys with a single scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkChunk {
    /// The masked key checksum identifying the group.
    pub idc: u32,
    /// The grouping mask of the level where the chunk was discovered.
    pub mask: u32,
}

/// One decoded row of a cascade level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelRow {
    /// Key checksum, masked by the level's grouping mask above the leaf.
    pub idc: u32,
    /// Row checksum at the leaf; XOR-folded group checksum above it.
    pub cks: u32,
    /// Textual key; present only at the leaf.
    pub id: Option<String>,
}

impl LevelRow {
    /// A summary-level row.
    pub fn summary(idc: u32, cks: u32) -> Self {
        Self { idc, cks, id: None }
    }

    /// A leaf-level row carrying its key.
    pub fn leaf(idc: u32, cks: u32, id: impl Into<String>) -> Self {
        Self {
            idc,
            cks,
            id: Some(id.into()),
        }
    }
}

/// Counters and deferred work produced by one walk of the cascades.
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    /// Updates emitted at the leaf.
    pub updates: u64,
    /// Inserts emitted at the leaf (bulk chunks not included).
    pub inserts: u64,
    /// Deletes emitted at the leaf (bulk chunks not included).
    pub deletes: u64,
    /// Left-only subtrees deferred to the bulk resolver.
    pub insert_chunks: Vec<BulkChunk>,
    /// Right-only subtrees deferred to the bulk resolver.
    pub delete_chunks: Vec<BulkChunk>,
    /// Number of cascade levels actually examined.
    pub levels_walked: usize,
}

/// Overall result of one `process` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareSummary {
    /// Row count of the left level-0 table.
    pub left_rows: u64,
    /// Row count of the right level-0 table.
    pub right_rows: u64,
    /// Effective folding factor after clamping.
    pub factor: u32,
    /// Effective number of cascade levels (after any `max_levels` cap).
    pub levels: usize,
    /// Total insert emissions, bulk path included.
    pub inserts: u64,
    /// Total update emissions.
    pub updates: u64,
    /// Total delete emissions, bulk path included.
    pub deletes: u64,
    /// Wall-clock spent building the level-0 checksum tables.
    pub checksum_ms: u64,
    /// Wall-clock spent building the summary cascades.
    pub summary_ms: u64,
    /// Wall-clock spent walking and merge-joining.
    pub walk_ms: u64,
    /// Wall-clock spent resolving bulk chunks.
    pub bulk_ms: u64,
    /// When `process` started.
    pub started_at: DateTime<Utc>,
    /// When `process` finished.
    pub completed_at: DateTime<Utc>,
}

impl CompareSummary {
    /// Total number of emitted differences.
    pub fn total_differences(&self) -> u64 {
        self.inserts + self.updates + self.deletes
    }

    /// Whether the two tables matched exactly.
    pub fn is_in_sync(&self) -> bool {
        self.total_differences() == 0
    }

    /// Log the summary at info level.
    pub fn log(&self) {
        tracing::info!(
            "compared {} vs {} rows (factor {}, {} levels): {} differences \
             ({} inserts, {} updates, {} deletes)",
            self.left_rows,
            self.right_rows,
            self.factor,
            self.levels,
            self.total_differences(),
            self.inserts,
            self.updates,
            self.deletes
        );
        tracing::info!(
            "phase timings: checksum {}ms, summary {}ms, walk {}ms, bulk {}ms",
            self.checksum_ms,
            self.summary_ms,
            self.walk_ms,
            self.bulk_ms
        );
    }
}
