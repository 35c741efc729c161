//! Batch estimation over workbooks.
//!
//! A workbook is a directory of CSV sheets. Each regular sheet `<name>` is
//! paired with its coded sample `<name>_20%`; an optional `extra` sheet holds
//! records coded outside the sampling scheme. Workbooks are independent of
//! each other, so a directory of them is processed in parallel and a failing
//! workbook only costs its own results.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use crate::FailedFile;
use crate::error::{Error, Result};
use crate::estimate::{CorpusEstimate, EstimateResult, estimate};
use crate::export::{
    ExportFormat, OutputBatch, TabularRecord, render_records, render_table, sanitize_file_stem,
    write_atomic,
};
use crate::partition::{Partition, PartitionOptions, count_metaphors, partition};
use crate::table::Table;

pub const DEFAULT_SAMPLE_SUFFIX: &str = "_20%";
pub const LF_SUFFIX: &str = "_lf";
pub const EXTRA_SHEET: &str = "extra";
pub const CONSOLIDATED_STEM: &str = "all_workbooks_summary";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetRole {
    Regular,
    Sample { of: String },
    Extra,
    Ignored,
}

/// Role of a sheet, decided from its name alone.
pub fn classify_sheet(name: &str, sample_suffix: &str) -> SheetRole {
    let lower = name.to_lowercase();
    if lower.contains("coding list") || lower.contains("coding_list") || name.ends_with(LF_SUFFIX) {
        SheetRole::Ignored
    } else if name == EXTRA_SHEET {
        SheetRole::Extra
    } else if let Some(base) = name.strip_suffix(sample_suffix).filter(|b| !b.is_empty()) {
        SheetRole::Sample {
            of: base.to_string(),
        }
    } else {
        SheetRole::Regular
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookOptions {
    pub partition: PartitionOptions,
    pub sample_suffix: String,
}

impl Default for WorkbookOptions {
    fn default() -> Self {
        Self {
            partition: PartitionOptions::default(),
            sample_suffix: DEFAULT_SAMPLE_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Workbook {
    pub name: String,
    sheets: BTreeMap<String, Table>,
}

impl Workbook {
    pub fn from_sheets(name: impl Into<String>, sheets: Vec<Table>) -> Self {
        Self {
            name: name.into(),
            sheets: sheets
                .into_iter()
                .map(|t| (t.name().to_string(), t))
                .collect(),
        }
    }

    /// Load every `.csv` file directly inside `dir` as a sheet.
    pub fn load(dir: &Path, name: impl Into<String>) -> Result<Self> {
        let mut sheets = Vec::new();
        let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| Error::io(dir, e))?.path();
            if path.is_file() && has_csv_extension(&path) {
                sheets.push(Table::from_csv_path(&path)?);
            }
        }
        Ok(Self::from_sheets(name, sheets))
    }

    pub fn sheet(&self, name: &str) -> Option<&Table> {
        self.sheets.get(name)
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }
}

fn has_csv_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Result for one regular sheet.
#[derive(Debug, Clone)]
pub struct SheetOutcome {
    pub estimate: EstimateResult,
    pub partition: Partition,
}

#[derive(Debug, Clone)]
pub struct WorkbookReport {
    pub workbook: String,
    pub sheets: Vec<SheetOutcome>,
    pub corpus: CorpusEstimate,
}

/// Partition and estimate every regular sheet of a workbook.
pub fn process_workbook(wb: &Workbook, opts: &WorkbookOptions) -> Result<WorkbookReport> {
    info!("processing workbook '{}'", wb.name);
    let extra_metaphors = match wb.sheet(EXTRA_SHEET) {
        Some(extra) => {
            let idx = extra.resolve(&opts.partition.annotation_col)?;
            let n = count_metaphors(extra.rows(), idx);
            info!("workbook '{}': {} metaphors in '{}'", wb.name, n, EXTRA_SHEET);
            n
        }
        None => 0,
    };

    let mut outcomes = Vec::new();
    for name in wb.sheet_names() {
        match classify_sheet(name, &opts.sample_suffix) {
            SheetRole::Regular => {}
            SheetRole::Sample { of } => {
                if wb.sheet(&of).is_none() {
                    warn!(
                        "workbook '{}': sample sheet '{}' has no regular sheet '{}'",
                        wb.name, name, of
                    );
                }
                continue;
            }
            SheetRole::Extra | SheetRole::Ignored => continue,
        }
        let Some(full) = wb.sheet(name) else {
            continue;
        };
        let sample_name = format!("{name}{}", opts.sample_suffix);
        let empty;
        let sample = match wb.sheet(&sample_name) {
            Some(s) => s,
            None => {
                warn!(
                    "workbook '{}': no sample sheet '{}', no estimate for '{}'",
                    wb.name, sample_name, name
                );
                empty = full.empty_like(sample_name.clone());
                &empty
            }
        };
        let part = partition(sample, full, &opts.partition).map_err(|e| in_workbook(&wb.name, e))?;
        let est = estimate(name, &part.counts);
        info!(
            "workbook '{}', sheet '{}': {} rows ({} LF, {} HF), estimate {:.2}",
            wb.name,
            name,
            est.counts.total_rows,
            est.counts.total_lf_rows,
            est.counts.total_hf_rows,
            est.final_estimate
        );
        outcomes.push(SheetOutcome {
            estimate: est,
            partition: part,
        });
    }

    let corpus = CorpusEstimate::from_sheets(
        outcomes.iter().map(|o| o.estimate.clone()).collect(),
        extra_metaphors,
    );
    Ok(WorkbookReport {
        workbook: wb.name.clone(),
        sheets: outcomes,
        corpus,
    })
}

fn in_workbook(workbook: &str, err: Error) -> Error {
    match err {
        Error::Schema { context, message } => Error::Schema {
            context: format!("workbook '{workbook}', {context}"),
            message,
        },
        other => other,
    }
}

/// One line of an estimate summary table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    #[serde(rename = "Workbook")]
    pub workbook: String,
    #[serde(rename = "Sheet")]
    pub sheet: String,
    #[serde(rename = "Total_Rows")]
    pub total_rows: usize,
    #[serde(rename = "Total_HF_Rows")]
    pub total_hf_rows: usize,
    #[serde(rename = "Total_LF_Rows")]
    pub total_lf_rows: usize,
    #[serde(rename = "Sample_Remaining_Rows")]
    pub sample_remaining_rows: usize,
    #[serde(rename = "Low_Freq_Metaphors")]
    pub low_freq_metaphors: usize,
    #[serde(rename = "Extra_Metaphors")]
    pub extra_metaphors: usize,
    #[serde(rename = "Sample_Metaphors")]
    pub sample_metaphors: usize,
    #[serde(rename = "HF_Estimated_Metaphors")]
    pub hf_estimated_metaphors: f64,
    #[serde(rename = "Final_Estimate")]
    pub final_estimate: f64,
}

impl TabularRecord for SummaryRow {
    fn headers() -> Vec<&'static str> {
        vec![
            "Workbook",
            "Sheet",
            "Total_Rows",
            "Total_HF_Rows",
            "Total_LF_Rows",
            "Sample_Remaining_Rows",
            "Low_Freq_Metaphors",
            "Extra_Metaphors",
            "Sample_Metaphors",
            "HF_Estimated_Metaphors",
            "Final_Estimate",
        ]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.workbook.clone(),
            self.sheet.clone(),
            self.total_rows.to_string(),
            self.total_hf_rows.to_string(),
            self.total_lf_rows.to_string(),
            self.sample_remaining_rows.to_string(),
            self.low_freq_metaphors.to_string(),
            self.extra_metaphors.to_string(),
            self.sample_metaphors.to_string(),
            format!("{:.2}", self.hf_estimated_metaphors),
            format!("{:.2}", self.final_estimate),
        ]
    }
}

pub const TOTAL_ROW_LABEL: &str = "TOTAL";

impl WorkbookReport {
    /// One row per sheet, then a TOTAL row that carries the `extra` count.
    pub fn summary_rows(&self) -> Vec<SummaryRow> {
        let mut rows: Vec<SummaryRow> = self
            .corpus
            .sheets
            .iter()
            .map(|s| SummaryRow {
                workbook: self.workbook.clone(),
                sheet: s.sheet.clone(),
                total_rows: s.counts.total_rows,
                total_hf_rows: s.counts.total_hf_rows,
                total_lf_rows: s.counts.total_lf_rows,
                sample_remaining_rows: s.counts.sample_remaining_rows,
                low_freq_metaphors: s.counts.low_freq_metaphors,
                extra_metaphors: 0,
                sample_metaphors: s.counts.sample_metaphors,
                hf_estimated_metaphors: s.hf_estimated_metaphors,
                final_estimate: s.final_estimate,
            })
            .collect();
        let sums = self.corpus.total_counts();
        rows.push(SummaryRow {
            workbook: self.workbook.clone(),
            sheet: TOTAL_ROW_LABEL.to_string(),
            total_rows: sums.total_rows,
            total_hf_rows: sums.total_hf_rows,
            total_lf_rows: sums.total_lf_rows,
            sample_remaining_rows: sums.sample_remaining_rows,
            low_freq_metaphors: sums.low_freq_metaphors,
            extra_metaphors: self.corpus.extra_metaphors,
            sample_metaphors: sums.sample_metaphors,
            hf_estimated_metaphors: self.corpus.hf_estimated_metaphors_total,
            final_estimate: self.corpus.final_estimate_total,
        });
        rows
    }

    /// Render the reduced samples, LF tables and the summary into `dir`.
    pub fn outputs(&self, dir: &Path, sample_suffix: &str, format: ExportFormat) -> Result<OutputBatch> {
        let mut batch = OutputBatch::new();
        for s in &self.sheets {
            let stem = sanitize_file_stem(&s.estimate.sheet);
            batch.add(
                dir.join(format!("{stem}{sample_suffix}.csv")),
                render_table(&s.partition.reduced_sample)?,
            );
            batch.add(
                dir.join(format!("{stem}{LF_SUFFIX}.csv")),
                render_table(&s.partition.low_freq)?,
            );
        }
        let summary = dir.join(format!(
            "{}_summary.{}",
            sanitize_file_stem(&self.workbook),
            format.extension()
        ));
        let bytes = match format {
            ExportFormat::Json => serde_json::to_vec_pretty(&EstimateDocument {
                workbook: &self.workbook,
                generated_at: Local::now().to_rfc3339(),
                estimate: &self.corpus,
            })?,
            _ => render_records(&self.summary_rows(), format)?,
        };
        batch.add(summary, bytes);
        Ok(batch)
    }
}

#[derive(Serialize)]
struct EstimateDocument<'a> {
    workbook: &'a str,
    generated_at: String,
    #[serde(flatten)]
    estimate: &'a CorpusEstimate,
}

/// Directories below `root` (inclusive) that contain at least one CSV sheet.
///
/// Anything under `exclude` (typically the output directory) is skipped.
pub fn find_workbooks(root: &Path, exclude: Option<&Path>) -> Vec<PathBuf> {
    let exclude = exclude.and_then(|p| p.canonicalize().ok());
    let mut dirs: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| match (&exclude, e.path().canonicalize()) {
            (Some(ex), Ok(p)) => !p.starts_with(ex),
            _ => true,
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_csv_extension(e.path()))
        .filter_map(|e| e.path().parent().map(Path::to_path_buf))
        .collect();
    dirs.sort();
    dirs.dedup();
    dirs
}

/// Workbook name: the directory path relative to `root`, or `root`'s own name.
pub fn workbook_name(root: &Path, dir: &Path) -> String {
    let rel = dir.strip_prefix(root).unwrap_or(dir);
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("_");
    if !joined.is_empty() {
        return joined;
    }
    root.canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "workbook".to_string())
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub reports: Vec<WorkbookReport>,
    pub written: Vec<PathBuf>,
    pub failed_files: Vec<FailedFile>,
}

/// Estimate every workbook under `root`, writing results to `outdir`.
///
/// Each workbook's files are written only after that workbook fully computed.
/// Failures are collected in the report instead of aborting the batch.
pub fn process_directory(
    root: &Path,
    outdir: &Path,
    opts: &WorkbookOptions,
    format: ExportFormat,
) -> Result<BatchReport> {
    if !root.is_dir() {
        return Err(Error::InvalidInput(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    let dirs = find_workbooks(root, Some(outdir));
    if dirs.is_empty() {
        return Err(Error::InvalidInput(format!(
            "no CSV sheets found under {}",
            root.display()
        )));
    }

    let results: Vec<(PathBuf, Result<(WorkbookReport, Vec<PathBuf>)>)> = dirs
        .par_iter()
        .map(|dir| {
            let name = workbook_name(root, dir);
            let res = Workbook::load(dir, name.clone())
                .and_then(|wb| process_workbook(&wb, opts))
                .and_then(|report| {
                    let batch = report.outputs(
                        &outdir.join(sanitize_file_stem(&name)),
                        &opts.sample_suffix,
                        format,
                    )?;
                    let written = batch.commit()?;
                    Ok((report, written))
                });
            (dir.clone(), res)
        })
        .collect();

    let mut batch = BatchReport::default();
    for (dir, res) in results {
        match res {
            Ok((report, written)) => {
                batch.written.extend(written);
                batch.reports.push(report);
            }
            Err(e) => {
                error!("Error processing {}: {}", dir.display(), e);
                batch.failed_files.push(FailedFile {
                    path: dir.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    if !batch.reports.is_empty() {
        let rows: Vec<SummaryRow> = batch
            .reports
            .iter()
            .flat_map(|r| r.summary_rows())
            .collect();
        let path = outdir.join(format!("{CONSOLIDATED_STEM}.{}", format.extension()));
        write_atomic(&path, &render_records(&rows, format)?)?;
        batch.written.push(path);
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(name: &str, body: &str) -> Table {
        let data = format!("id,pos,item,context,code\n{body}");
        Table::from_csv_reader(name, data.as_bytes()).unwrap()
    }

    fn repeat(item: &str, n: usize, code: &str) -> String {
        (0..n).map(|i| format!("{i},N,{item},c{i},{code}\n")).collect()
    }

    #[test]
    fn classifies_sheet_names() {
        assert_eq!(classify_sheet("S7.1+", "_20%"), SheetRole::Regular);
        assert_eq!(
            classify_sheet("S7.1+_20%", "_20%"),
            SheetRole::Sample {
                of: "S7.1+".to_string()
            }
        );
        assert_eq!(classify_sheet("extra", "_20%"), SheetRole::Extra);
        assert_eq!(classify_sheet("S7.1+_lf", "_20%"), SheetRole::Ignored);
        assert_eq!(classify_sheet("Coding Lists", "_20%"), SheetRole::Ignored);
        assert_eq!(classify_sheet("Coding_lists", "_20%"), SheetRole::Ignored);
        assert_eq!(classify_sheet("_20%", "_20%"), SheetRole::Regular);
    }

    #[test]
    fn workbook_totals_include_extra() {
        // 40 "go" rows (HF), 5 "rare" rows (LF); sample holds 8 go rows (2 metaphors)
        // and all 5 rare rows (3 metaphors).
        let full = sheet("A", &format!("{}{}", repeat("go", 40, ""), repeat("rare", 5, "")));
        let mut sample_body = repeat("go", 8, "N");
        sample_body = sample_body.replacen(",N\n", ",Y\n", 2);
        sample_body.push_str(&repeat("rare", 3, "O"));
        sample_body.push_str(&repeat("rare", 2, "N"));
        let sample = sheet("A_20%", &sample_body);
        let extra = sheet("extra", &repeat("misc", 4, "y"));
        let coding = sheet("Coding List", "");
        let wb = Workbook::from_sheets("wb", vec![full, sample, extra, coding]);

        let report = process_workbook(&wb, &WorkbookOptions::default()).unwrap();
        assert_eq!(report.sheets.len(), 1);
        let est = &report.corpus.sheets[0];
        assert_eq!(est.counts.total_rows, 45);
        assert_eq!(est.counts.total_lf_rows, 5);
        assert_eq!(est.counts.total_hf_rows, 40);
        assert_eq!(est.counts.low_freq_metaphors, 3);
        assert_eq!(est.counts.sample_remaining_rows, 8);
        assert_eq!(est.counts.sample_metaphors, 2);
        assert!((est.hf_estimated_metaphors - 10.0).abs() < 1e-9);
        assert_eq!(report.corpus.extra_metaphors, 4);
        assert!((report.corpus.final_estimate_total - 17.0).abs() < 1e-9);

        let rows = report.summary_rows();
        assert_eq!(rows.len(), 2);
        let total = rows.last().unwrap();
        assert_eq!(total.sheet, TOTAL_ROW_LABEL);
        assert_eq!(total.extra_metaphors, 4);
        assert!((total.final_estimate - 17.0).abs() < 1e-9);
    }

    #[test]
    fn missing_sample_sheet_counts_rows_only() {
        let full = sheet("B", &repeat("rare", 3, "Y"));
        let wb = Workbook::from_sheets("wb", vec![full]);
        let report = process_workbook(&wb, &WorkbookOptions::default()).unwrap();
        let est = &report.corpus.sheets[0];
        assert_eq!(est.counts.total_rows, 3);
        assert_eq!(est.counts.total_lf_rows, 0);
        assert_eq!(est.counts.total_hf_rows, 3);
        assert_eq!(est.counts.low_freq_metaphors, 0);
        assert_eq!(est.hf_estimated_metaphors, 0.0);
    }

    #[test]
    fn schema_errors_name_the_workbook() {
        let full = Table::from_csv_reader("C", "only,two\n1,2\n".as_bytes()).unwrap();
        let wb = Workbook::from_sheets("broken", vec![full]);
        let err = process_workbook(&wb, &WorkbookOptions::default())
            .unwrap_err()
            .to_string();
        assert!(err.contains("broken"), "{err}");
        assert!(err.contains("'C'"), "{err}");
    }
}
