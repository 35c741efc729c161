//! Low/high frequency partitioning of a coded sample against its full sheet.
//!
//! Low-frequency types are coded exhaustively, so their rows are pulled out of
//! the sample into a separate table. Only the rows that remain in the sample
//! feed the high-frequency scale-up.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use serde::Serialize;

use crate::error::Result;
use crate::table::{ColumnRef, Row, Table, cell};

pub const DEFAULT_LF_THRESHOLD: usize = 20;

/// Frequency class of a word type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyBucket {
    Low,
    High,
}

impl FrequencyBucket {
    pub fn classify(count: usize, threshold: usize) -> Self {
        if count <= threshold {
            FrequencyBucket::Low
        } else {
            FrequencyBucket::High
        }
    }
}

/// Annotation values counted as a metaphor occurrence.
///
/// Only `Y` and `O` (either case) qualify; empty cells and every other code do not.
pub fn is_metaphor(annotation: Option<&str>) -> bool {
    matches!(
        annotation.map(|a| a.to_uppercase()).as_deref(),
        Some("Y") | Some("O")
    )
}

/// Number of metaphor rows in `rows`, reading the annotation at `ann_idx`.
pub fn count_metaphors<'a, I>(rows: I, ann_idx: usize) -> usize
where
    I: IntoIterator<Item = &'a Row>,
{
    rows.into_iter()
        .filter(|row| is_metaphor(cell(row, ann_idx)))
        .count()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionOptions {
    pub identity_col: ColumnRef,
    pub annotation_col: ColumnRef,
    pub threshold: usize,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            identity_col: ColumnRef::Position(3),
            annotation_col: ColumnRef::Position(5),
            threshold: DEFAULT_LF_THRESHOLD,
        }
    }
}

/// Exact counts for one sheet, before any extrapolation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SheetCounts {
    pub total_rows: usize,
    pub total_hf_rows: usize,
    pub total_lf_rows: usize,
    pub sample_remaining_rows: usize,
    pub low_freq_metaphors: usize,
    pub sample_metaphors: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Sample rows whose type is low-frequency, in sample order.
    pub low_freq: Table,
    /// The sample with every low-frequency row removed.
    pub reduced_sample: Table,
    /// Low-frequency identities, sorted.
    pub low_freq_types: Vec<String>,
    pub counts: SheetCounts,
}

/// Occurrences per exact identity string. Rows with an empty identity are skipped.
pub fn identity_counts(table: &Table, identity_idx: usize) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in table.rows() {
        if let Some(id) = cell(row, identity_idx) {
            *counts.entry(id.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// Split `sample` into low-frequency rows and the reduced high-frequency sample.
///
/// Identity counts come from `full`, the pre-sampling sheet. Every sample row
/// whose identity is low-frequency moves to the LF table; LF rows that were
/// never drawn stay part of the HF population. Neither input is modified.
pub fn partition(sample: &Table, full: &Table, opts: &PartitionOptions) -> Result<Partition> {
    let f_id = full.resolve(&opts.identity_col)?;
    full.resolve(&opts.annotation_col)?;
    let s_id = sample.resolve(&opts.identity_col)?;
    let s_ann = sample.resolve(&opts.annotation_col)?;

    let counts = identity_counts(full, f_id);
    let lf_types: HashSet<&str> = counts
        .iter()
        .filter(|(_, c)| FrequencyBucket::classify(**c, opts.threshold) == FrequencyBucket::Low)
        .map(|(id, _)| id.as_str())
        .collect();
    debug!(
        "sheet '{}': {} types, {} low-frequency",
        full.name(),
        counts.len(),
        lf_types.len()
    );

    let mut low_freq = sample.empty_like(format!("{}_lf", full.name()));
    let mut reduced = sample.empty_like(sample.name());
    for row in sample.rows() {
        if cell(row, s_id).is_some_and(|id| lf_types.contains(id)) {
            low_freq.push_row(row.clone());
        } else {
            reduced.push_row(row.clone());
        }
    }

    let total_rows = full.len();
    let total_lf_rows = low_freq.len();
    if total_lf_rows > total_rows {
        warn!(
            "sheet '{}': {} low-frequency sample rows but only {} rows in '{}'",
            sample.name(),
            total_lf_rows,
            total_rows,
            full.name()
        );
    }
    let counts_out = SheetCounts {
        total_rows,
        total_hf_rows: total_rows.saturating_sub(total_lf_rows),
        total_lf_rows,
        sample_remaining_rows: reduced.len(),
        low_freq_metaphors: count_metaphors(low_freq.rows(), s_ann),
        sample_metaphors: count_metaphors(reduced.rows(), s_ann),
    };

    let mut low_freq_types: Vec<String> = lf_types.iter().map(|s| s.to_string()).collect();
    low_freq_types.sort();

    Ok(Partition {
        low_freq,
        reduced_sample: reduced,
        low_freq_types,
        counts: counts_out,
    })
}
