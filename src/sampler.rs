//! Proportional stratified sampling of word-type records.
//!
//! Every group is sampled independently and without replacement. Groups smaller
//! than the floor are kept whole so no group ends up with zero coded rows.

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{Error, Result};
use crate::grouper::group_by_key;
use crate::table::{ColumnRef, Row, Table, cell};

/// Key used for rows whose grouping cell is empty.
pub const NULL_GROUP_KEY: &str = "none";

#[derive(Debug, Clone, PartialEq)]
pub struct SampleOptions {
    /// Fraction of each group to draw, in (0, 1].
    pub fraction: f64,
    /// Groups smaller than this are taken whole.
    pub min_group_size: usize,
    /// Fixed seed for reproducible draws; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            fraction: 0.2,
            min_group_size: 20,
            seed: None,
        }
    }
}

impl SampleOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.fraction > 0.0 && self.fraction <= 1.0) {
            return Err(Error::InvalidInput(format!(
                "sampling fraction must be in (0, 1], got {}",
                self.fraction
            )));
        }
        if self.min_group_size < 1 {
            return Err(Error::InvalidInput(
                "minimum group size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Number of records drawn from a group of `group_len`.
pub fn sample_size(group_len: usize, opts: &SampleOptions) -> usize {
    if group_len < opts.min_group_size {
        group_len
    } else {
        let n = (group_len as f64 * opts.fraction).floor() as usize;
        n.max(1)
    }
}

/// A drawn record together with the group it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Sampled<T> {
    pub group: String,
    pub record: T,
}

/// Stratified sample of `records` grouped by `key_fn`.
///
/// Groups are visited in first-appearance order with one RNG, so a fixed seed
/// reproduces the same sample. The input slice is not modified.
pub fn sample<T, F>(records: &[T], key_fn: F, opts: &SampleOptions) -> Result<Vec<Sampled<T>>>
where
    T: Clone,
    F: Fn(&T) -> String,
{
    opts.validate()?;
    let mut rng = opts.rng();
    let mut out = Vec::new();
    for group in group_by_key(records, key_fn) {
        let len = group.members.len();
        let n = sample_size(len, opts);
        debug!("group '{}': drawing {} of {}", group.key, n, len);
        if len < opts.min_group_size {
            out.extend(group.members.iter().map(|r| Sampled {
                group: group.key.clone(),
                record: (*r).clone(),
            }));
        } else {
            out.extend(
                group
                    .members
                    .choose_multiple(&mut rng, n)
                    .map(|r| Sampled {
                        group: group.key.clone(),
                        record: (*r).clone(),
                    }),
            );
        }
    }
    Ok(out)
}

/// Sampled rows of a table, keeping its header, with per-row provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledSet {
    pub table: Table,
    /// Group key each row was drawn from, parallel to `table.rows()`.
    pub provenance: Vec<String>,
}

/// Sample a table, grouping on `key_col`. The result is named `name`.
pub fn sample_table(
    table: &Table,
    key_col: &ColumnRef,
    opts: &SampleOptions,
    name: impl Into<String>,
) -> Result<SampledSet> {
    let idx = table.resolve(key_col)?;
    let drawn = sample(
        table.rows(),
        |row: &Row| cell(row, idx).unwrap_or(NULL_GROUP_KEY).to_string(),
        opts,
    )?;
    let mut out = table.empty_like(name);
    let mut provenance = Vec::with_capacity(drawn.len());
    for s in drawn {
        provenance.push(s.group);
        out.push_row(s.record);
    }
    Ok(SampledSet {
        table: out,
        provenance,
    })
}
