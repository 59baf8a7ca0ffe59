//! End-to-end walker scenarios over an in-memory checksum cascade.
//!
//! `MemorySource` stands in for one side's database session: it builds the
//! same level-0/summary structure the engine creates server-side (a local
//! CRC-32 plays the scalar checksum, XOR the aggregate) and answers level
//! fetches and bulk scans the way the SQL implementation does. The walker
//! itself cannot tell the difference, so every classification scenario can
//! run without a server.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use mysql_table_compare::{
    fold_masks, walk, BulkChunk, Change, ChangeType, CompareError, LevelRow, LevelSource, Result,
};

/// Reflected CRC-32 (IEEE polynomial), bitwise.
fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

/// One side's cascade, fully materialized in memory.
struct MemorySource {
    levels: Vec<Vec<LevelRow>>,
}

impl MemorySource {
    /// Build the cascade for `rows` of `(key, values)` pairs, both already
    /// in their separator-joined textual form.
    fn build(rows: &[(String, String)], masks: &[u32]) -> Self {
        let leaf: Vec<LevelRow> = rows
            .iter()
            .map(|(key, vals)| {
                let idc = crc32(key.as_bytes());
                let cks = crc32(format!("{}:{}", key, vals).as_bytes());
                LevelRow::leaf(idc, cks, key.clone())
            })
            .collect();

        let mut levels = vec![leaf];
        for k in 1..masks.len() {
            let mut groups: BTreeMap<u32, u32> = BTreeMap::new();
            for row in &levels[k - 1] {
                *groups.entry(row.idc & masks[k]).or_insert(0) ^= row.cks;
            }
            levels.push(
                groups
                    .into_iter()
                    .map(|(idc, cks)| LevelRow::summary(idc, cks))
                    .collect(),
            );
        }

        Self { levels }
    }
}

#[async_trait]
impl LevelSource for MemorySource {
    async fn fetch_level(
        &mut self,
        level: usize,
        at_leaf: bool,
        parent_mask: u32,
        investigate: &[u32],
    ) -> Result<Vec<LevelRow>> {
        assert_eq!(at_leaf, level == 0);
        let mut rows: Vec<LevelRow> = self.levels[level]
            .iter()
            .filter(|row| {
                investigate.is_empty() || investigate.contains(&(row.idc & parent_mask))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.idc, a.cks).cmp(&(b.idc, b.cks)));
        Ok(rows)
    }

    async fn fetch_chunk_keys(&mut self, chunks: &[BulkChunk]) -> Result<Vec<String>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let mut keys: Vec<String> = self.levels[0]
            .iter()
            .filter(|row| chunks.iter().any(|c| row.idc & c.mask == c.idc))
            .filter_map(|row| row.id.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

fn rows(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Drive a full comparison the way the engine does: walk, then resolve
/// deferred chunks (inserts from the left leaf, deletes from the right).
async fn compare_with(
    left: &[(String, String)],
    right: &[(String, String)],
    factor: u32,
    max_levels: usize,
    max_report: u32,
    parallel: bool,
) -> Result<Vec<Change>> {
    let size = left.len().max(right.len()) as u64;
    let masks = fold_masks(size, factor, max_levels);

    let mut left_src = MemorySource::build(left, &masks);
    let mut right_src = MemorySource::build(right, &masks);

    let mut changes = Vec::new();
    let mut emit = |c: &Change| changes.push(c.clone());
    let outcome = walk(
        &mut left_src,
        &mut right_src,
        &masks,
        max_report,
        parallel,
        &mut emit,
    )
    .await?;

    for key in left_src.fetch_chunk_keys(&outcome.insert_chunks).await? {
        changes.push(Change::new(ChangeType::Insert, key));
    }
    for key in right_src.fetch_chunk_keys(&outcome.delete_chunks).await? {
        changes.push(Change::new(ChangeType::Delete, key));
    }

    Ok(changes)
}

async fn compare(left: &[(String, String)], right: &[(String, String)]) -> Vec<Change> {
    compare_with(left, right, 7, 0, 32, false).await.unwrap()
}

fn as_set(changes: &[Change]) -> BTreeSet<(String, String)> {
    changes
        .iter()
        .map(|c| (c.kind.to_string(), c.key.clone()))
        .collect()
}

#[tokio::test]
async fn identical_tables_emit_nothing() {
    let data = rows(&[("1", "a:x"), ("2", "b:y"), ("3", "c:z")]);
    let changes = compare(&data, &data).await;
    assert!(changes.is_empty(), "got {:?}", changes);
}

#[tokio::test]
async fn single_update_is_detected() {
    let left = rows(&[("1", "a"), ("2", "b")]);
    let right = rows(&[("1", "a"), ("2", "B")]);
    let changes = compare(&left, &right).await;
    assert_eq!(changes, vec![Change::new(ChangeType::Update, "2")]);
}

#[tokio::test]
async fn insert_only_row_is_detected() {
    let left = rows(&[("1", "a"), ("2", "b"), ("3", "c")]);
    let right = rows(&[("1", "a"), ("2", "b")]);
    let changes = compare(&left, &right).await;
    assert_eq!(
        as_set(&changes),
        BTreeSet::from([("insert".to_string(), "3".to_string())])
    );
}

#[tokio::test]
async fn delete_only_row_is_detected() {
    let left = rows(&[("1", "a"), ("2", "b")]);
    let right = rows(&[("1", "a"), ("2", "b"), ("3", "c")]);
    let changes = compare(&left, &right).await;
    assert_eq!(
        as_set(&changes),
        BTreeSet::from([("delete".to_string(), "3".to_string())])
    );
}

#[tokio::test]
async fn composite_keys_mix_update_and_delete() {
    let left = rows(&[("10:1", "alice:9")]);
    let right = rows(&[("10:1", "alice:10"), ("10:2", "bob:9")]);
    let changes = compare(&left, &right).await;
    assert_eq!(
        as_set(&changes),
        BTreeSet::from([
            ("update".to_string(), "10:1".to_string()),
            ("delete".to_string(), "10:2".to_string()),
        ])
    );
}

#[tokio::test]
async fn bulk_tail_of_inserts_is_fully_reported() {
    let left: Vec<(String, String)> = (1..=1000)
        .map(|i| (i.to_string(), format!("val{}", i)))
        .collect();
    let right: Vec<(String, String)> = left[..500].to_vec();

    // 500 missing rows spread across nearly every mid-level bucket, so the
    // effort guard must be off for the walk to reach the leaves.
    let changes = compare_with(&left, &right, 7, 0, 0, false).await.unwrap();
    let expected: BTreeSet<(String, String)> = (501..=1000)
        .map(|i| ("insert".to_string(), i.to_string()))
        .collect();
    assert_eq!(as_set(&changes), expected);
    assert_eq!(changes.len(), 500);
}

#[tokio::test]
async fn empty_right_side_resolves_through_bulk_chunks() {
    let left: Vec<(String, String)> = (1..=100)
        .map(|i| (i.to_string(), format!("val{}", i)))
        .collect();
    let masks = fold_masks(100, 7, 0);

    let mut left_src = MemorySource::build(&left, &masks);
    let mut right_src = MemorySource::build(&[], &masks);

    let mut emit = |_: &Change| panic!("nothing should be emitted mid-walk");
    let outcome = walk(&mut left_src, &mut right_src, &masks, 32, false, &mut emit)
        .await
        .unwrap();

    // The whole left tree is one-sided at the root, so everything defers.
    assert_eq!(outcome.inserts, 0);
    assert!(!outcome.insert_chunks.is_empty());
    assert!(outcome.delete_chunks.is_empty());

    let keys = left_src
        .fetch_chunk_keys(&outcome.insert_chunks)
        .await
        .unwrap();
    assert_eq!(keys.len(), 100);
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted, "bulk keys must arrive ordered");
}

#[tokio::test]
async fn reflexivity_across_factors_and_caps() {
    let data: Vec<(String, String)> = (1..=64)
        .map(|i| (format!("k{}", i), format!("payload:{}", i * 31)))
        .collect();

    for factor in [1u32, 2, 7, 30] {
        for max_levels in [0usize, 1, 2] {
            let changes = compare_with(&data, &data, factor, max_levels, 0, false)
                .await
                .unwrap();
            assert!(
                changes.is_empty(),
                "factor {} max_levels {} reported {:?}",
                factor,
                max_levels,
                changes
            );
        }
    }
}

#[tokio::test]
async fn swapping_sides_swaps_insert_and_delete() {
    let left = rows(&[("1", "a"), ("2", "b"), ("3", "c"), ("5", "e")]);
    let right = rows(&[("1", "a"), ("2", "B"), ("4", "d"), ("5", "e")]);

    let forward = compare(&left, &right).await;
    let backward = compare(&right, &left).await;

    let flipped: BTreeSet<(String, String)> = backward
        .iter()
        .map(|c| {
            let kind = match c.kind {
                ChangeType::Insert => ChangeType::Delete,
                ChangeType::Delete => ChangeType::Insert,
                ChangeType::Update => ChangeType::Update,
            };
            (kind.to_string(), c.key.clone())
        })
        .collect();

    assert_eq!(as_set(&forward), flipped);
}

#[tokio::test]
async fn runs_are_deterministic() {
    let left: Vec<(String, String)> = (1..=200)
        .map(|i| (i.to_string(), format!("v{}", i)))
        .collect();
    let right: Vec<(String, String)> = (1..=200)
        .map(|i| {
            let val = if i % 17 == 0 {
                format!("changed{}", i)
            } else {
                format!("v{}", i)
            };
            (i.to_string(), val)
        })
        .collect();

    let first = compare_with(&left, &right, 7, 0, 0, false).await.unwrap();
    let second = compare_with(&left, &right, 7, 0, 0, false).await.unwrap();
    assert_eq!(first, second);
    assert!(!first.is_empty());

    // Parallel fetching may not reorder anything either: emission happens
    // on the walking task.
    let parallel = compare_with(&left, &right, 7, 0, 0, true).await.unwrap();
    assert_eq!(first, parallel);
}

#[tokio::test]
async fn max_report_aborts_wide_investigations() {
    let left: Vec<(String, String)> = (1..=50)
        .map(|i| (i.to_string(), "x".to_string()))
        .collect();
    let right: Vec<(String, String)> = (1..=50)
        .map(|i| (i.to_string(), "y".to_string()))
        .collect();

    let err = compare_with(&left, &right, 3, 0, 1, false)
        .await
        .unwrap_err();
    assert!(
        matches!(err, CompareError::EffortExceeded { limit: 1, .. }),
        "unexpected error {:?}",
        err
    );

    // The same comparison succeeds with the guard disabled.
    let changes = compare_with(&left, &right, 3, 0, 0, false).await.unwrap();
    assert_eq!(changes.len(), 50);
    assert!(changes.iter().all(|c| c.kind == ChangeType::Update));
}

#[tokio::test]
async fn truncated_cascade_still_classifies() {
    let left = rows(&[("1", "a"), ("2", "b"), ("3", "c")]);
    let right = rows(&[("1", "a"), ("2", "B"), ("4", "d")]);

    // A single-level cascade degenerates to a straight leaf comparison.
    let changes = compare_with(&left, &right, 7, 1, 32, false).await.unwrap();
    assert_eq!(
        as_set(&changes),
        BTreeSet::from([
            ("update".to_string(), "2".to_string()),
            ("insert".to_string(), "3".to_string()),
            ("delete".to_string(), "4".to_string()),
        ])
    );
}
