#![forbid(unsafe_code)]
//! # metaphor_stats CLI
//!
//! Command-line front end for the `metaphor_stats` crate.
//!
//! ## Subcommands
//! - `sample`: stratified 20% sample of a sheet for manual coding.
//! - `estimate`: scale coded samples back up to whole-corpus metaphor estimates.
//! - `significance`: log-likelihood and log ratio per vehicle group (SSC vs LEC).
//! - `tagset`: tally candidate semantic tags for one labelled subset.
//!
//! ## Example
//! ```bash
//! cargo run --release -- significance --input groups.csv --outdir outputs
//! ```
//!
//! Set `RUST_LOG=info` for progress output.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use log::error;
use metaphor_stats::export::render_records;
use metaphor_stats::{
    ColumnRef, ExportFormat, PartitionOptions, SampleOptions, SignificanceOptions, TagsetOptions,
    WorkbookOptions, analyze_path, print_failed_files, process_directory, sample_file, tagset_file,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Draw a stratified random sample of a CSV sheet
    Sample {
        /// CSV sheet to sample
        #[arg(long)]
        input: PathBuf,

        /// Grouping column (header name or 1-based position)
        #[arg(long, default_value = "3", value_parser = <ColumnRef as std::str::FromStr>::from_str)]
        group_col: ColumnRef,

        /// Fraction of each group to draw
        #[arg(long, default_value_t = 0.2)]
        fraction: f64,

        /// Groups smaller than this are kept whole
        #[arg(long, default_value_t = 20)]
        min_group_size: usize,

        /// Seed for a reproducible draw (default: random)
        #[arg(long)]
        seed: Option<u64>,

        /// Output directory
        #[arg(long, default_value = ".")]
        outdir: PathBuf,

        /// Suffix appended to the sheet name for the sample
        #[arg(long, default_value = "_20%")]
        suffix: String,
    },

    /// Estimate whole-corpus metaphor counts from coded samples
    Estimate {
        /// Workbook directory (CSV sheets) or a directory of workbooks
        #[arg(long)]
        input: PathBuf,

        /// Output directory
        #[arg(long, default_value = "outputs")]
        outdir: PathBuf,

        /// Word-type column (header name or 1-based position)
        #[arg(long, default_value = "3", value_parser = <ColumnRef as std::str::FromStr>::from_str)]
        identity_col: ColumnRef,

        /// Metaphor annotation column (header name or 1-based position)
        #[arg(long, default_value = "5", value_parser = <ColumnRef as std::str::FromStr>::from_str)]
        annotation_col: ColumnRef,

        /// Types occurring at most this often are low-frequency
        #[arg(long, default_value_t = 20)]
        threshold: usize,

        /// Suffix identifying sample sheets
        #[arg(long, default_value = "_20%")]
        sample_suffix: String,

        /// Output format for summaries (txt, csv, tsv, json)
        #[arg(long, default_value = "csv")]
        export_format: ExportFormat,
    },

    /// Compare vehicle groups between SSC and LEC
    Significance {
        /// CSV with Vehicle_group, SSC_Raw, SSC_RF, LEC_Raw, LEC_RF (file or directory)
        #[arg(long)]
        input: PathBuf,

        /// Output directory
        #[arg(long, default_value = "outputs")]
        outdir: PathBuf,

        /// SSC corpus size in words (otherwise inferred from the TOTALS row)
        #[arg(long = "ssc_words")]
        ssc_words: Option<f64>,

        /// LEC corpus size in words (otherwise inferred from the TOTALS row)
        #[arg(long = "lec_words")]
        lec_words: Option<f64>,

        /// Prefix for output file names
        #[arg(long, default_value = "metaphor")]
        prefix: String,

        /// Output format (txt, csv, tsv, json)
        #[arg(long, default_value = "csv")]
        export_format: ExportFormat,
    },

    /// Count candidate tags for rows carrying one label
    Tagset {
        /// CSV sheet with items and tag columns
        #[arg(long)]
        input: PathBuf,

        /// Value selecting the rows to tally
        #[arg(long)]
        filter_value: String,

        /// Column holding the filter value
        #[arg(long, default_value = "2", value_parser = <ColumnRef as std::str::FromStr>::from_str)]
        filter_col: ColumnRef,

        /// Column holding the item string
        #[arg(long, default_value = "4", value_parser = <ColumnRef as std::str::FromStr>::from_str)]
        item_col: ColumnRef,

        /// First tag column; every column after it is a tag too
        #[arg(long, default_value = "5", value_parser = <ColumnRef as std::str::FromStr>::from_str)]
        tags_start: ColumnRef,

        /// CSV of tag definitions (tag, definition)
        #[arg(long)]
        definitions: Option<PathBuf>,

        /// Output directory
        #[arg(long, default_value = ".")]
        outdir: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let ok = match cli.command {
        Command::Sample {
            input,
            group_col,
            fraction,
            min_group_size,
            seed,
            outdir,
            suffix,
        } => {
            let opts = SampleOptions {
                fraction,
                min_group_size,
                seed,
            };
            match sample_file(&input, &group_col, &opts, &outdir, &suffix) {
                Ok(path) => {
                    println!("{}", path.display());
                    true
                }
                Err(e) => fail(&e),
            }
        }
        Command::Estimate {
            input,
            outdir,
            identity_col,
            annotation_col,
            threshold,
            sample_suffix,
            export_format,
        } => {
            let opts = WorkbookOptions {
                partition: PartitionOptions {
                    identity_col,
                    annotation_col,
                    threshold,
                },
                sample_suffix,
            };
            match process_directory(&input, &outdir, &opts, export_format) {
                Ok(batch) => {
                    for report in &batch.reports {
                        match render_records(&report.summary_rows(), ExportFormat::Txt) {
                            Ok(text) => println!("{}", String::from_utf8_lossy(&text)),
                            Err(e) => error!("Error rendering summary: {}", e),
                        }
                    }
                    for path in &batch.written {
                        println!("{}", path.display());
                    }
                    if batch.failed_files.is_empty() {
                        true
                    } else {
                        print_failed_files(&batch.failed_files);
                        false
                    }
                }
                Err(e) => fail(&e),
            }
        }
        Command::Significance {
            input,
            outdir,
            ssc_words,
            lec_words,
            prefix,
            export_format,
        } => {
            let opts = SignificanceOptions {
                ssc_words,
                lec_words,
            };
            match analyze_path(&input, &outdir, &prefix, &opts, export_format) {
                Ok(report) => {
                    for path in &report.written {
                        println!("- Results: {}", path.display());
                    }
                    if report.failed_files.is_empty() {
                        true
                    } else {
                        print_failed_files(&report.failed_files);
                        false
                    }
                }
                Err(e) => fail(&e),
            }
        }
        Command::Tagset {
            input,
            filter_value,
            filter_col,
            item_col,
            tags_start,
            definitions,
            outdir,
        } => {
            let opts = TagsetOptions {
                filter_col,
                filter_value,
                item_col,
                tags_start_col: tags_start,
            };
            match tagset_file(&input, definitions.as_deref(), &opts, &outdir) {
                Ok(path) => {
                    println!("{}", path.display());
                    true
                }
                Err(e) => fail(&e),
            }
        }
    };

    if !ok {
        process::exit(1);
    }
}

fn fail(e: &metaphor_stats::Error) -> bool {
    error!("Error: {}", e);
    eprintln!("Error: {e}");
    false
}
