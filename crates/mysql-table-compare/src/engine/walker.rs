//! Cascade descent and merge-join.
//!
//! The walker starts at the root summary tables and descends level by
//! level. At each level it fetches the same ordered slice from both sides
//! and merge-joins the two streams on `idc`: groups whose folded checksums
//! agree are pruned, disagreeing groups feed the next level's
//! investigation set, and groups present on one side only are deferred as
//! bulk chunks. At the leaf the merge emits concrete row classifications.
//!
//! Fetching is behind the [`LevelSource`] seam so the algorithm itself
//! never touches SQL; the engine plugs in one session per side.

use async_trait::async_trait;

use crate::engine::types::{BulkChunk, Change, ChangeType, LevelRow, WalkOutcome};
use crate::error::{CompareError, Result};

/// One side's view of its checksum cascade.
#[async_trait]
pub trait LevelSource: Send {
    /// Fetch the rows of cascade level `level`, ordered by `(idc, cks)`.
    ///
    /// When `investigate` is nonempty only rows whose
    /// `idc & parent_mask` falls in the set are returned. The textual key
    /// is populated only when `at_leaf` is set.
    async fn fetch_level(
        &mut self,
        level: usize,
        at_leaf: bool,
        parent_mask: u32,
        investigate: &[u32],
    ) -> Result<Vec<LevelRow>>;

    /// Resolve deferred bulk chunks into concrete keys, ordered by key.
    async fn fetch_chunk_keys(&mut self, chunks: &[BulkChunk]) -> Result<Vec<String>>;
}

/// Everything one merge pass over a level produces.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct LevelOutcome {
    /// Masked group checksums to examine at the next level down.
    pub investigate: Vec<u32>,
    /// Leaf emissions, in merge order.
    pub changes: Vec<Change>,
    /// Left-only subtrees found at this level.
    pub insert_chunks: Vec<BulkChunk>,
    /// Right-only subtrees found at this level.
    pub delete_chunks: Vec<BulkChunk>,
}

impl LevelOutcome {
    /// Record a disagreeing group, collapsing adjacent duplicates (the
    /// input streams are sorted, so duplicates are consecutive).
    fn push_investigate(&mut self, idc: u32) {
        if self.investigate.last() != Some(&idc) {
            self.investigate.push(idc);
        }
    }

    fn take_left_only(&mut self, row: LevelRow, level_mask: u32, at_leaf: bool) -> Result<()> {
        if at_leaf {
            let id = row
                .id
                .ok_or_else(|| CompareError::internal("leaf row without id on the left side"))?;
            self.changes.push(Change::new(ChangeType::Insert, id));
        } else {
            self.insert_chunks.push(BulkChunk {
                idc: row.idc,
                mask: level_mask,
            });
        }
        Ok(())
    }

    fn take_right_only(&mut self, row: LevelRow, level_mask: u32, at_leaf: bool) -> Result<()> {
        if at_leaf {
            let id = row
                .id
                .ok_or_else(|| CompareError::internal("leaf row without id on the right side"))?;
            self.changes.push(Change::new(ChangeType::Delete, id));
        } else {
            self.delete_chunks.push(BulkChunk {
                idc: row.idc,
                mask: level_mask,
            });
        }
        Ok(())
    }
}

enum Step {
    Pair,
    LeftOnly,
    RightOnly,
    Done,
}

/// Merge-join two ordered level streams.
///
/// Rows with equal `idc` are consumed pair-at-a-time; the row whose `idc`
/// sorts lower (or whose peer stream is exhausted) is one-sided. Updates
/// report the left side's key.
pub(crate) fn merge_level(
    left: Vec<LevelRow>,
    right: Vec<LevelRow>,
    level_mask: u32,
    at_leaf: bool,
) -> Result<LevelOutcome> {
    let mut out = LevelOutcome::default();
    let mut l = left.into_iter().peekable();
    let mut r = right.into_iter().peekable();

    loop {
        let step = match (l.peek(), r.peek()) {
            (None, None) => Step::Done,
            (Some(_), None) => Step::LeftOnly,
            (None, Some(_)) => Step::RightOnly,
            (Some(a), Some(b)) => {
                if a.idc == b.idc {
                    Step::Pair
                } else if a.idc < b.idc {
                    Step::LeftOnly
                } else {
                    Step::RightOnly
                }
            }
        };

        match step {
            Step::Done => break,
            Step::Pair => {
                let (Some(a), Some(b)) = (l.next(), r.next()) else {
                    return Err(CompareError::internal("merge consumed past a peeked pair"));
                };
                if a.cks != b.cks {
                    if at_leaf {
                        let id = a.id.ok_or_else(|| {
                            CompareError::internal("leaf row without id on the left side")
                        })?;
                        out.changes.push(Change::new(ChangeType::Update, id));
                    } else {
                        out.push_investigate(a.idc);
                    }
                }
            }
            Step::LeftOnly => {
                let Some(a) = l.next() else {
                    return Err(CompareError::internal("merge consumed past a peeked left row"));
                };
                out.take_left_only(a, level_mask, at_leaf)?;
            }
            Step::RightOnly => {
                let Some(b) = r.next() else {
                    return Err(CompareError::internal(
                        "merge consumed past a peeked right row",
                    ));
                };
                out.take_right_only(b, level_mask, at_leaf)?;
            }
        }
    }

    Ok(out)
}

/// Descend both cascades from the root and classify every difference.
///
/// `masks` is the leaf-first mask vector; the walk visits level
/// `masks.len() - 1` (root) down to level 0 (leaf), pruning identical
/// subtrees as it goes. Leaf changes are handed to `emit` in merge order;
/// one-sided subtrees above the leaf are returned as deferred chunks.
///
/// When `parallel` is set the two per-level fetches overlap; the first
/// failure cancels the peer fetch.
pub async fn walk<S: LevelSource>(
    left: &mut S,
    right: &mut S,
    masks: &[u32],
    max_report: u32,
    parallel: bool,
    emit: &mut (dyn FnMut(&Change) + Send),
) -> Result<WalkOutcome> {
    let levels = masks.len();
    let mut outcome = WalkOutcome::default();
    let mut investigate: Vec<u32> = Vec::new();
    let mut parent_mask: u32 = 0;

    for k in (0..levels).rev() {
        if max_report > 0 && investigate.len() > max_report as usize {
            return Err(CompareError::EffortExceeded {
                level: k,
                found: investigate.len(),
                limit: max_report,
            });
        }

        let at_leaf = k == 0;
        tracing::debug!(
            "walking level {} ({} groups under investigation)",
            k,
            investigate.len()
        );

        let (left_rows, right_rows) = if parallel {
            tokio::try_join!(
                left.fetch_level(k, at_leaf, parent_mask, &investigate),
                right.fetch_level(k, at_leaf, parent_mask, &investigate)
            )?
        } else {
            (
                left.fetch_level(k, at_leaf, parent_mask, &investigate)
                    .await?,
                right
                    .fetch_level(k, at_leaf, parent_mask, &investigate)
                    .await?,
            )
        };

        let level = merge_level(left_rows, right_rows, masks[k], at_leaf)?;
        outcome.levels_walked += 1;

        for change in &level.changes {
            match change.kind {
                ChangeType::Insert => outcome.inserts += 1,
                ChangeType::Update => outcome.updates += 1,
                ChangeType::Delete => outcome.deletes += 1,
            }
            emit(change);
        }
        outcome.insert_chunks.extend(level.insert_chunks);
        outcome.delete_chunks.extend(level.delete_chunks);

        if at_leaf {
            break;
        }

        investigate = level.investigate;
        parent_mask = masks[k];

        // No disagreeing group survived; anything left is already
        // deferred as bulk chunks.
        if investigate.is_empty() {
            break;
        }
    }

    Ok(outcome)
}
