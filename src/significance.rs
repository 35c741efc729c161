//! Cross-corpus comparison of vehicle groups (SSC vs LEC).
//!
//! For every vehicle group a 2×2 contingency table is built from the raw
//! counts and the two corpus sizes. The log-likelihood statistic G² is tested
//! against a chi-square distribution with one degree of freedom, and the log2
//! ratio of the relative frequencies (per 1,000 words) gives the effect size.
//!
//! Effect size and significance are independent: a large ratio over tiny
//! counts can still be `ns`.

use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::error::{Error, Result};
use crate::export::TabularRecord;
use crate::table::{ColumnRef, Table, cell};

/// Label of the corpus-wide aggregate row (matched case-insensitively).
pub const TOTALS_LABEL: &str = "TOTALS";
/// Stand-in relative frequency for a corpus where the group never occurs.
pub const ZERO_RF_FLOOR: f64 = 1e-5;
/// Upper bound for reported p-values.
pub const P_VALUE_CAP: f64 = 0.9999;
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;
/// Relative frequencies are per this many words.
pub const RF_BASE: f64 = 1000.0;

/// Input column headers, in report order.
pub const INPUT_COLUMNS: [&str; 5] = ["Vehicle_group", "SSC_Raw", "SSC_RF", "LEC_Raw", "LEC_RF"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleGroupInput {
    pub vehicle_group: String,
    pub ssc_raw: f64,
    pub ssc_rf: f64,
    pub lec_raw: f64,
    pub lec_rf: f64,
}

impl VehicleGroupInput {
    pub fn new(vehicle_group: &str, ssc_raw: f64, ssc_rf: f64, lec_raw: f64, lec_rf: f64) -> Self {
        Self {
            vehicle_group: vehicle_group.to_string(),
            ssc_raw,
            ssc_rf,
            lec_raw,
            lec_rf,
        }
    }

    pub fn is_totals(&self) -> bool {
        self.vehicle_group.trim().eq_ignore_ascii_case(TOTALS_LABEL)
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("SSC_Raw", self.ssc_raw),
            ("SSC_RF", self.ssc_rf),
            ("LEC_Raw", self.lec_raw),
            ("LEC_RF", self.lec_rf),
        ];
        for (name, v) in fields {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "vehicle group '{}': {name} must be a finite number >= 0, got {v}",
                    self.vehicle_group
                )));
            }
        }
        Ok(())
    }
}

/// Word counts of the two corpora.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorpusSizes {
    pub ssc_words: f64,
    pub lec_words: f64,
}

impl CorpusSizes {
    pub fn new(ssc_words: f64, lec_words: f64) -> Result<Self> {
        check_size("SSC", ssc_words)?;
        check_size("LEC", lec_words)?;
        Ok(Self {
            ssc_words,
            lec_words,
        })
    }

    /// Corpus sizes implied by a TOTALS row: `raw * 1000 / rf`.
    pub fn from_totals(totals: &VehicleGroupInput) -> Result<Self> {
        Self::new(
            words_from_rf(totals.ssc_raw, totals.ssc_rf),
            words_from_rf(totals.lec_raw, totals.lec_rf),
        )
    }

    /// Use supplied sizes where given, infer the rest from the TOTALS row.
    pub fn resolve(
        groups: &[VehicleGroupInput],
        ssc_words: Option<f64>,
        lec_words: Option<f64>,
    ) -> Result<Self> {
        if let (Some(ssc), Some(lec)) = (ssc_words, lec_words) {
            return Self::new(ssc, lec);
        }
        let totals = groups
            .iter()
            .find(|g| g.is_totals())
            .ok_or(Error::MissingTotalsRow)?;
        let ssc = ssc_words.unwrap_or_else(|| words_from_rf(totals.ssc_raw, totals.ssc_rf));
        let lec = lec_words.unwrap_or_else(|| words_from_rf(totals.lec_raw, totals.lec_rf));
        Self::new(ssc, lec)
    }
}

fn words_from_rf(raw: f64, rf: f64) -> f64 {
    if rf > 0.0 { raw * RF_BASE / rf } else { 0.0 }
}

fn check_size(corpus: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidCorpusSize { corpus, value })
    }
}

/// 2×2 log-likelihood statistic G² for counts `a` (SSC) and `b` (LEC).
///
/// Cells with a zero observed count contribute nothing (0·ln 0 = 0).
pub fn g2_log_likelihood(a: f64, b: f64, ssc_words: f64, lec_words: f64) -> f64 {
    let total = ssc_words + lec_words;
    if total <= 0.0 {
        return 0.0;
    }
    let c = ssc_words - a;
    let d = lec_words - b;
    let cells = [
        (a, (a + b) * ssc_words / total),
        (b, (a + b) * lec_words / total),
        (c, (c + d) * ssc_words / total),
        (d, (c + d) * lec_words / total),
    ];
    let sum: f64 = cells
        .iter()
        .filter(|(obs, exp)| *obs > 0.0 && *exp > 0.0)
        .map(|(obs, exp)| obs * (obs / exp).ln())
        .sum();
    (2.0 * sum).max(0.0)
}

/// Chi-square (df = 1) survival function at `g2`, capped at [`P_VALUE_CAP`].
pub fn p_value(g2: f64) -> f64 {
    let p = ChiSquared::new(1.0)
        .map(|dist| dist.sf(g2.max(0.0)))
        .unwrap_or(1.0);
    p.min(P_VALUE_CAP)
}

/// log2(ssc_rf / lec_rf), with [`ZERO_RF_FLOOR`] substituted for a zero side.
pub fn log_ratio(ssc_rf: f64, lec_rf: f64) -> f64 {
    match (ssc_rf > 0.0, lec_rf > 0.0) {
        (true, true) => (ssc_rf / lec_rf).log2(),
        (true, false) => (ssc_rf / ZERO_RF_FLOOR).log2(),
        (false, true) => -(lec_rf / ZERO_RF_FLOOR).log2(),
        (false, false) => 0.0,
    }
}

/// Significance band of a p-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SigMarker {
    #[serde(rename = "****")]
    P0001,
    #[serde(rename = "***")]
    P001,
    #[serde(rename = "*")]
    P05,
    #[serde(rename = "ns")]
    NotSignificant,
}

impl SigMarker {
    pub fn from_p(p: f64) -> Self {
        if p < 1e-4 {
            SigMarker::P0001
        } else if p < 1e-3 {
            SigMarker::P001
        } else if p < SIGNIFICANCE_LEVEL {
            SigMarker::P05
        } else {
            SigMarker::NotSignificant
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SigMarker::P0001 => "****",
            SigMarker::P001 => "***",
            SigMarker::P05 => "*",
            SigMarker::NotSignificant => "ns",
        }
    }
}

impl fmt::Display for SigMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable reading of a log ratio. Says nothing about significance.
pub fn interpretation(lr: f64, totals: bool) -> String {
    let suffix = if totals { " overall" } else { "" };
    if lr > 0.0 {
        format!("SSC uses {:.1}× more{suffix}", lr.exp2())
    } else if lr < 0.0 {
        format!("LEC uses {:.1}× more{suffix}", lr.abs().exp2())
    } else {
        format!("No difference{suffix}")
    }
}

pub fn format_p_value(p: f64) -> String {
    if p < 1e-4 {
        "< 0.0001".to_string()
    } else {
        format!("{p:.4}")
    }
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Statistics for one vehicle group, unrounded.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleGroupStat {
    pub input: VehicleGroupInput,
    pub log_likelihood: f64,
    pub p_value: f64,
    pub significant: bool,
    pub sig_marker: SigMarker,
    pub log_ratio: f64,
    pub interpretation: String,
    /// Set on the corpus-wide TOTALS row.
    pub is_totals: bool,
}

impl VehicleGroupStat {
    pub fn compute(input: &VehicleGroupInput, sizes: &CorpusSizes) -> Self {
        let is_totals = input.is_totals();
        let g2 = g2_log_likelihood(input.ssc_raw, input.lec_raw, sizes.ssc_words, sizes.lec_words);
        let p = p_value(g2);
        let lr = log_ratio(input.ssc_rf, input.lec_rf);
        let mut input = input.clone();
        if is_totals {
            input.vehicle_group = TOTALS_LABEL.to_string();
        }
        Self {
            input,
            log_likelihood: g2,
            p_value: p,
            significant: p < SIGNIFICANCE_LEVEL,
            sig_marker: SigMarker::from_p(p),
            log_ratio: lr,
            interpretation: interpretation(lr, is_totals),
            is_totals,
        }
    }

    /// Rounded row for reports.
    pub fn to_record(&self) -> StatRecord {
        StatRecord {
            vehicle_group: self.input.vehicle_group.clone(),
            ssc_raw: self.input.ssc_raw,
            ssc_rf: self.input.ssc_rf,
            lec_raw: self.input.lec_raw,
            lec_rf: self.input.lec_rf,
            log_likelihood: round2(self.log_likelihood),
            p_value: self.p_value,
            significant: self.significant,
            sig_marker: self.sig_marker.as_str().to_string(),
            log_ratio: round2(self.log_ratio),
            interpretation: self.interpretation.clone(),
            p_value_formatted: format_p_value(self.p_value),
        }
    }
}

/// One output row of the statistics table, columns in report order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRecord {
    #[serde(rename = "Vehicle_group")]
    pub vehicle_group: String,
    #[serde(rename = "SSC_Raw")]
    pub ssc_raw: f64,
    #[serde(rename = "SSC_RF")]
    pub ssc_rf: f64,
    #[serde(rename = "LEC_Raw")]
    pub lec_raw: f64,
    #[serde(rename = "LEC_RF")]
    pub lec_rf: f64,
    #[serde(rename = "Log_Likelihood")]
    pub log_likelihood: f64,
    pub p_value: f64,
    #[serde(rename = "Significant")]
    pub significant: bool,
    #[serde(rename = "Sig_Marker")]
    pub sig_marker: String,
    #[serde(rename = "Log_Ratio")]
    pub log_ratio: f64,
    #[serde(rename = "Interpretation")]
    pub interpretation: String,
    pub p_value_formatted: String,
}

pub const OUTPUT_COLUMNS: [&str; 12] = [
    "Vehicle_group",
    "SSC_Raw",
    "SSC_RF",
    "LEC_Raw",
    "LEC_RF",
    "Log_Likelihood",
    "p_value",
    "Significant",
    "Sig_Marker",
    "Log_Ratio",
    "Interpretation",
    "p_value_formatted",
];

impl TabularRecord for StatRecord {
    fn headers() -> Vec<&'static str> {
        OUTPUT_COLUMNS.to_vec()
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.vehicle_group.clone(),
            self.ssc_raw.to_string(),
            self.ssc_rf.to_string(),
            self.lec_raw.to_string(),
            self.lec_rf.to_string(),
            self.log_likelihood.to_string(),
            self.p_value.to_string(),
            self.significant.to_string(),
            self.sig_marker.clone(),
            self.log_ratio.to_string(),
            self.interpretation.clone(),
            self.p_value_formatted.clone(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignificanceOptions {
    pub ssc_words: Option<f64>,
    pub lec_words: Option<f64>,
}

/// Compare every vehicle group between the two corpora.
///
/// Non-TOTALS groups keep their input order; the TOTALS row, if any, is
/// computed the same way and appended last.
pub fn compare(groups: &[VehicleGroupInput], opts: &SignificanceOptions) -> Result<Vec<VehicleGroupStat>> {
    for g in groups {
        g.validate()?;
    }
    let sizes = CorpusSizes::resolve(groups, opts.ssc_words, opts.lec_words)?;
    info!(
        "corpus sizes: SSC {:.0} words, LEC {:.0} words",
        sizes.ssc_words,
        sizes.lec_words
    );
    let mut out: Vec<VehicleGroupStat> = groups
        .iter()
        .filter(|g| !g.is_totals())
        .map(|g| VehicleGroupStat::compute(g, &sizes))
        .collect();
    let mut totals = groups.iter().filter(|g| g.is_totals());
    if let Some(first) = totals.next() {
        let extra = totals.count();
        if extra > 0 {
            warn!(
                "{} TOTALS rows found; using the first and ignoring {} more",
                extra + 1,
                extra
            );
        }
        out.push(VehicleGroupStat::compute(first, &sizes));
    }
    Ok(out)
}

/// Read vehicle-group rows from a table with the [`INPUT_COLUMNS`] headers.
pub fn load_groups(table: &Table) -> Result<Vec<VehicleGroupInput>> {
    let idx: Vec<usize> = INPUT_COLUMNS
        .iter()
        .map(|c| table.resolve(&ColumnRef::from(*c)))
        .collect::<Result<_>>()?;
    let mut out = Vec::with_capacity(table.len());
    for (i, row) in table.rows().iter().enumerate() {
        let line = i + 2;
        let context = || format!("sheet '{}', row {line}", table.name());
        let vehicle_group = cell(row, idx[0])
            .map(|s| s.trim().to_string())
            .ok_or_else(|| Error::schema(context(), "empty Vehicle_group"))?;
        let mut nums = [0.0_f64; 4];
        for (k, slot) in nums.iter_mut().enumerate() {
            let col = INPUT_COLUMNS[k + 1];
            let raw = cell(row, idx[k + 1])
                .ok_or_else(|| Error::schema(context(), format!("empty {col}")))?;
            let v: f64 = raw.trim().parse().map_err(|_| {
                Error::schema(context(), format!("{col} is not a number: '{raw}'"))
            })?;
            if !v.is_finite() || v < 0.0 {
                return Err(Error::schema(
                    context(),
                    format!("{col} must be a finite number >= 0, got '{raw}'"),
                ));
            }
            *slot = v;
        }
        out.push(VehicleGroupInput {
            vehicle_group,
            ssc_raw: nums[0],
            ssc_rf: nums[1],
            lec_raw: nums[2],
            lec_rf: nums[3],
        });
    }
    Ok(out)
}
