//! Scale-up of sampled high-frequency metaphor counts to whole-sheet estimates.
//!
//! The high-frequency rate observed in the reduced sample is applied to the
//! full high-frequency population (a ratio extrapolation). Low-frequency and
//! `extra` metaphors are exact counts and are added without scaling. No
//! variance or confidence interval is produced.

use log::warn;
use serde::Serialize;

use crate::partition::SheetCounts;

/// Counts for one sheet together with the extrapolated estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateResult {
    pub sheet: String,
    #[serde(flatten)]
    pub counts: SheetCounts,
    pub hf_estimated_metaphors: f64,
    /// HF estimate plus exact LF metaphors, without `extra`.
    pub final_estimate: f64,
}

/// Estimated high-frequency metaphors: sample rate times the HF population.
///
/// Returns `0.0` for an empty reduced sample rather than dividing by zero.
pub fn hf_estimate(counts: &SheetCounts) -> f64 {
    if counts.sample_remaining_rows == 0 {
        return 0.0;
    }
    counts.sample_metaphors as f64 / counts.sample_remaining_rows as f64
        * counts.total_hf_rows as f64
}

/// Complete the estimate for one sheet. Pure; `counts` is only read.
pub fn estimate(sheet: impl Into<String>, counts: &SheetCounts) -> EstimateResult {
    let sheet = sheet.into();
    if counts.sample_remaining_rows == 0 && counts.total_hf_rows > 0 {
        warn!(
            "sheet '{}': no sampled high-frequency rows left, HF estimate set to 0 for {} HF rows",
            sheet, counts.total_hf_rows
        );
    }
    let hf = hf_estimate(counts);
    EstimateResult {
        sheet,
        counts: *counts,
        hf_estimated_metaphors: hf,
        final_estimate: hf + counts.low_freq_metaphors as f64,
    }
}

impl EstimateResult {
    pub fn final_estimate_excluding_extra(&self) -> f64 {
        self.final_estimate
    }
}

/// Estimates for every sheet of one workbook plus the out-of-scheme `extra` count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusEstimate {
    pub sheets: Vec<EstimateResult>,
    pub extra_metaphors: usize,
    pub hf_estimated_metaphors_total: f64,
    pub low_freq_metaphors_total: usize,
    pub final_estimate_total: f64,
}

impl CorpusEstimate {
    pub fn from_sheets(sheets: Vec<EstimateResult>, extra_metaphors: usize) -> Self {
        let hf_total: f64 = sheets.iter().map(|s| s.hf_estimated_metaphors).sum();
        let lf_total: usize = sheets.iter().map(|s| s.counts.low_freq_metaphors).sum();
        Self {
            sheets,
            extra_metaphors,
            hf_estimated_metaphors_total: hf_total,
            low_freq_metaphors_total: lf_total,
            final_estimate_total: hf_total + lf_total as f64 + extra_metaphors as f64,
        }
    }

    /// Column-wise sums of the per-sheet counts.
    pub fn total_counts(&self) -> SheetCounts {
        self.sheets
            .iter()
            .fold(SheetCounts::default(), |acc, s| SheetCounts {
                total_rows: acc.total_rows + s.counts.total_rows,
                total_hf_rows: acc.total_hf_rows + s.counts.total_hf_rows,
                total_lf_rows: acc.total_lf_rows + s.counts.total_lf_rows,
                sample_remaining_rows: acc.sample_remaining_rows
                    + s.counts.sample_remaining_rows,
                low_freq_metaphors: acc.low_freq_metaphors + s.counts.low_freq_metaphors,
                sample_metaphors: acc.sample_metaphors + s.counts.sample_metaphors,
            })
    }
}
