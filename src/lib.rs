#![forbid(unsafe_code)]
//! # metaphor_stats
//!
//! Estimation and comparison of metaphor frequencies across two corpora.
//!
//! The pipeline has three stages:
//!
//! 1. [`sampler`]: draw a proportional stratified sample of word-type rows so
//!    that only a fraction has to be coded by hand.
//! 2. [`partition`] + [`estimate`]: pull exhaustively coded low-frequency
//!    types out of the coded sample and scale the remaining high-frequency rate
//!    back up to a whole-sheet estimate. [`workbook`] runs this over
//!    directories of CSV sheets.
//! 3. [`significance`]: log-likelihood (G²) test and log2 ratio effect size
//!    for every vehicle group between SSC and LEC.
//!
//! Input and output are CSV tables (see [`table`] and [`export`]).

pub mod error;
pub mod estimate;
pub mod export;
pub mod grouper;
pub mod partition;
pub mod sampler;
pub mod significance;
pub mod table;
pub mod tagset;
pub mod workbook;

use std::path::{Path, PathBuf};

use log::{error, info, warn};
use walkdir::WalkDir;

pub use error::{Error, Result};
pub use estimate::{CorpusEstimate, EstimateResult, estimate};
pub use export::{ExportFormat, csv_safe_cell};
pub use grouper::group_by_key;
pub use partition::{FrequencyBucket, Partition, PartitionOptions, SheetCounts, is_metaphor, partition};
pub use sampler::{SampleOptions, SampledSet, sample, sample_table};
pub use significance::{
    CorpusSizes, SigMarker, SignificanceOptions, StatRecord, VehicleGroupInput, VehicleGroupStat,
    compare,
};
pub use table::{ColumnRef, Table};
pub use tagset::{TagsetOptions, tally_tags};
pub use workbook::{BatchReport, WorkbookOptions, process_directory, process_workbook};

/// A file that could not be processed, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
}

/// Outcome of a run over one or more input files.
#[derive(Debug, Default)]
pub struct RunReport {
    pub written: Vec<PathBuf>,
    pub failed_files: Vec<FailedFile>,
}

pub fn print_failed_files(failed: &[FailedFile]) {
    eprintln!("\nThe following files could not be processed:");
    for f in failed {
        eprintln!("  {}: {}", f.path, f.error);
    }
}

/// CSV files at `path`: the file itself, or every `.csv` below a directory (sorted).
pub fn collect_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map(|x| x.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Draw a stratified sample from one CSV sheet and write `<stem><suffix>.csv` to `outdir`.
pub fn sample_file(
    input: &Path,
    key_col: &ColumnRef,
    opts: &SampleOptions,
    outdir: &Path,
    suffix: &str,
) -> Result<PathBuf> {
    let table = Table::from_csv_path(input)?;
    if table.is_empty() {
        warn!("sheet '{}' has no rows, writing an empty sample", table.name());
    }
    let name = format!("{}{suffix}", table.name());
    let set = sample_table(&table, key_col, opts, name.clone())?;
    info!(
        "sheet '{}': sampled {} of {} rows",
        table.name(),
        set.table.len(),
        table.len()
    );
    let path = outdir.join(format!("{}.csv", export::sanitize_file_stem(&name)));
    export::write_atomic(&path, &export::render_table(&set.table)?)?;
    Ok(path)
}

/// Compute the statistics table for one vehicle-group CSV.
pub fn significance_table(input: &Path, opts: &SignificanceOptions) -> Result<Vec<StatRecord>> {
    let table = Table::from_csv_path(input)?;
    let groups = significance::load_groups(&table)?;
    let stats = compare(&groups, opts)?;
    Ok(stats.iter().map(VehicleGroupStat::to_record).collect())
}

/// Run the significance engine over a CSV file or every CSV in a directory.
///
/// Output for a single file is `<prefix>_statistics_results.<ext>`; with a
/// directory each file gets `<prefix>_<stem>_statistics_results.<ext>`. A file
/// that fails is reported and skipped.
pub fn analyze_path(
    input: &Path,
    outdir: &Path,
    prefix: &str,
    opts: &SignificanceOptions,
    format: ExportFormat,
) -> Result<RunReport> {
    if !input.exists() {
        return Err(Error::io(
            input,
            std::io::Error::new(std::io::ErrorKind::NotFound, "input not found"),
        ));
    }
    let single = input.is_file();
    let files = collect_files(input);
    if files.is_empty() {
        return Err(Error::InvalidInput(format!(
            "no CSV files found under {}",
            input.display()
        )));
    }
    let mut report = RunReport::default();
    for file in files {
        let stem = if single {
            prefix.to_string()
        } else {
            format!("{prefix}_{}", export::sanitize_file_stem(&file_stem(&file)))
        };
        let out = outdir.join(format!("{stem}_statistics_results.{}", format.extension()));
        let res = significance_table(&file, opts)
            .and_then(|records| export::render_records(&records, format))
            .and_then(|bytes| export::write_atomic(&out, &bytes));
        match res {
            Ok(()) => report.written.push(out),
            Err(e) if single => return Err(e),
            Err(e) => {
                error!("Error analyzing {}: {}", file.display(), e);
                report.failed_files.push(FailedFile {
                    path: file.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}

/// Tally candidate tags for one filter value and write `<value>_VG.csv`.
pub fn tagset_file(
    input: &Path,
    definitions: Option<&Path>,
    opts: &TagsetOptions,
    outdir: &Path,
) -> Result<PathBuf> {
    let table = Table::from_csv_path(input)?;
    let defs = match definitions {
        Some(p) => tagset::load_definitions(&Table::from_csv_path(p)?)?,
        None => Default::default(),
    };
    let counts = tally_tags(&table, opts, &defs)?;
    info!(
        "'{}': {} distinct tags for '{}'",
        table.name(),
        counts.len(),
        opts.filter_value
    );
    let path = outdir.join(format!(
        "{}_VG.csv",
        export::sanitize_file_stem(&opts.filter_value)
    ));
    export::write_atomic(&path, &export::render_records(&counts, ExportFormat::Csv)?)?;
    Ok(path)
}
