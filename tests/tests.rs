//! Integration tests for `metaphor_stats`.
//
// This suite verifies:
// - Library behaviour end to end (sample -> code -> partition -> estimate, significance)
// - CLI behaviour for every subcommand, including failure exits
// - Batch resilience when one workbook is broken
//
// Notes:
// - CLI tests run the binary with a per-process working directory (no global CWD change).
// - Library tests that write relative outputs change the global CWD and are marked #[serial].

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use regex::Regex;
use serde_json::Value as Json;
use serial_test::serial;
use tempfile::tempdir;

use metaphor_stats::{
    ColumnRef, ExportFormat, PartitionOptions, SampleOptions, SignificanceOptions, Table,
    TagsetOptions, WorkbookOptions, analyze_path, partition, process_directory, sample_file,
    sample_table, tagset_file,
};

// --------------------- helpers ---------------------

/// Create a file with content in a temp dir.
fn write_file(dir: &assert_fs::TempDir, name: &str, content: &str) -> PathBuf {
    let f = dir.child(name);
    f.write_str(content).unwrap();
    f.path().to_path_buf()
}

/// Read file to string.
fn read_to_string<P: AsRef<Path>>(p: P) -> String {
    fs::read_to_string(p).unwrap()
}

/// Run CLI successfully with a specific working directory.
fn run_cli_ok_in(dir: &Path, args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = assert_cmd::Command::cargo_bin("metaphor_stats").unwrap();
    cmd.current_dir(dir);
    cmd.args(args).assert().success()
}

/// Run CLI expecting failure with a specific working directory.
fn run_cli_fail_in(dir: &Path, args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = assert_cmd::Command::cargo_bin("metaphor_stats").unwrap();
    cmd.current_dir(dir);
    cmd.args(args).assert().failure()
}

/// A full sheet: `n` rows per (item, pos) pair, uncoded.
fn full_sheet(items: &[(&str, &str, usize)]) -> String {
    let mut s = String::from("id,pos,item,context,code\n");
    let mut id = 0;
    for (item, pos, n) in items {
        for _ in 0..*n {
            s.push_str(&format!("{id},{pos},{item},ctx {id},\n"));
            id += 1;
        }
    }
    s
}

const GROUPS_CSV: &str = "Vehicle_group,SSC_Raw,SSC_RF,LEC_Raw,LEC_RF\n\
Body,50,2.5,10,0.8\n\
Light,1,0.05,12,0.96\n\
Journey,20,1,12.5,1\n\
TOTALS,400,20,250,20\n";

// --------------------- library tests ---------------------

#[test]
fn lib_sample_then_partition_never_double_counts() {
    let data = full_sheet(&[("go", "V", 60), ("see", "V", 25), ("run", "V", 15), ("cat", "N", 3)]);
    let full = Table::from_csv_reader("S1", data.as_bytes()).unwrap();
    let opts = SampleOptions {
        seed: Some(11),
        ..SampleOptions::default()
    };
    let set = sample_table(&full, &ColumnRef::Position(3), &opts, "S1_20%").unwrap();
    // go: 12, see: 5, run: all 15, cat: all 3
    assert_eq!(set.table.len(), 35);

    // Code every sampled row as a metaphor.
    let coded_rows: Vec<_> = set
        .table
        .rows()
        .iter()
        .map(|r| {
            let mut r = r.clone();
            r[4] = Some("Y".to_string());
            r
        })
        .collect();
    let coded = Table::new("S1_20%", full.headers().to_vec(), coded_rows);

    let p = partition(&coded, &full, &PartitionOptions::default()).unwrap();
    assert_eq!(p.counts.total_rows, 103);
    assert_eq!(p.counts.total_lf_rows, 18);
    assert_eq!(p.counts.total_hf_rows, 85);
    assert_eq!(p.counts.low_freq_metaphors, 18);
    assert_eq!(p.counts.sample_remaining_rows, 17);
    for lf in &p.low_freq_types {
        assert!(
            p.reduced_sample
                .rows()
                .iter()
                .all(|r| r[2].as_deref() != Some(lf.as_str()))
        );
    }
    let est = metaphor_stats::estimate("S1", &p.counts);
    assert!((est.hf_estimated_metaphors - 85.0).abs() < 1e-9);
    assert!(est.final_estimate >= est.counts.low_freq_metaphors as f64);
}

#[test]
fn lib_analyze_path_writes_ordered_columns() {
    let td = assert_fs::TempDir::new().unwrap();
    let input = write_file(&td, "groups.csv", GROUPS_CSV);
    let out = td.path().join("out");
    let report = analyze_path(
        &input,
        &out,
        "metaphor",
        &SignificanceOptions::default(),
        ExportFormat::Csv,
    )
    .expect("analyze_path");
    assert_eq!(report.written, vec![out.join("metaphor_statistics_results.csv")]);

    let text = read_to_string(&report.written[0]);
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Vehicle_group,SSC_Raw,SSC_RF,LEC_Raw,LEC_RF,Log_Likelihood,p_value,Significant,Sig_Marker,Log_Ratio,Interpretation,p_value_formatted"
    );
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 4);
    assert!(rows[0].starts_with("Body,50,2.5,10,0.8,13.62,"), "{}", rows[0]);
    assert!(rows[0].contains(",true,***,1.64,SSC uses 3.1× more,"), "{}", rows[0]);
    assert!(rows[2].contains("No difference"), "{}", rows[2]);
    assert!(rows[3].starts_with("TOTALS,"));
    assert!(rows[3].contains("overall"));
}

#[test]
fn lib_significance_missing_totals_fails_without_sizes() {
    let td = assert_fs::TempDir::new().unwrap();
    let input = write_file(
        &td,
        "groups.csv",
        "Vehicle_group,SSC_Raw,SSC_RF,LEC_Raw,LEC_RF\nBody,50,2.5,10,0.8\n",
    );
    let err = analyze_path(
        &input,
        td.path(),
        "m",
        &SignificanceOptions::default(),
        ExportFormat::Csv,
    )
    .unwrap_err();
    assert!(matches!(err, metaphor_stats::Error::MissingTotalsRow));
    // Nothing written on failure.
    assert!(!td.path().join("m_statistics_results.csv").exists());

    let ok = analyze_path(
        &input,
        td.path(),
        "m",
        &SignificanceOptions {
            ssc_words: Some(20_000.0),
            lec_words: Some(12_500.0),
        },
        ExportFormat::Json,
    )
    .unwrap();
    let v: Json = serde_json::from_str(&read_to_string(&ok.written[0])).unwrap();
    assert_eq!(v[0]["Vehicle_group"], "Body");
    assert_eq!(v[0]["Sig_Marker"], "***");
    assert_eq!(v[0]["Log_Ratio"], 1.64);
}

#[test]
fn lib_process_directory_skips_broken_workbook() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "wb1/S1.csv", &full_sheet(&[("go", "V", 30), ("rare", "N", 4)]));
    let mut sample = String::from("id,pos,item,context,code\n");
    for i in 0..6 {
        let code = if i < 3 { "Y" } else { "N" };
        sample.push_str(&format!("{i},V,go,ctx {i},{code}\n"));
    }
    for i in 30..34 {
        sample.push_str(&format!("{i},N,rare,ctx {i},O\n"));
    }
    write_file(&td, "wb1/S1_20%.csv", &sample);
    write_file(&td, "wb1/extra.csv", "id,pos,item,context,code\n1,N,x,c,Y\n2,N,y,c,N\n");
    // Two columns only: the default identity column #3 does not exist.
    write_file(&td, "wb2/S1.csv", "a,b\n1,2\n");

    let out = td.path().join("outputs");
    let batch = process_directory(td.path(), &out, &WorkbookOptions::default(), ExportFormat::Csv)
        .expect("batch runs");
    assert_eq!(batch.reports.len(), 1);
    assert_eq!(batch.failed_files.len(), 1);
    assert!(batch.failed_files[0].path.ends_with("wb2"));

    let corpus = &batch.reports[0].corpus;
    // 3/6 * 30 = 15 HF, 4 LF, 1 extra
    assert!((corpus.final_estimate_total - 20.0).abs() < 1e-9);

    assert!(out.join("wb1").join("S1_20%.csv").exists());
    assert!(out.join("wb1").join("S1_lf.csv").exists());
    assert!(out.join("wb1").join("wb1_summary.csv").exists());
    assert!(!out.join("wb2").exists());
    let consolidated = read_to_string(out.join("all_workbooks_summary.csv"));
    assert!(consolidated.contains("wb1,TOTAL,34,30,4,6,4,1,3,15.00,20.00"), "{consolidated}");

    let lf = Table::from_csv_path(&out.join("wb1").join("S1_lf.csv")).unwrap();
    assert_eq!(lf.len(), 4);
    let reduced = Table::from_csv_path(&out.join("wb1").join("S1_20%.csv")).unwrap();
    assert_eq!(reduced.len(), 6);
}

#[test]
#[serial]
fn lib_relative_outdir_writes_into_cwd() {
    let td = assert_fs::TempDir::new().unwrap();
    let input = write_file(&td, "S9.csv", &full_sheet(&[("go", "V", 30)]));
    let tags = write_file(&td, "tags.csv", "id,file,n,item,t1\n1,a.xlsx,1,fight,=S7.1+\n");

    // Change CWD so "." outputs land in td
    std::env::set_current_dir(td.path()).unwrap();
    let sampled = sample_file(
        &input,
        &ColumnRef::from("item"),
        &SampleOptions {
            seed: Some(3),
            ..SampleOptions::default()
        },
        Path::new("."),
        "_20%",
    )
    .expect("sample_file");
    assert!(td.path().join("S9_20%.csv").exists(), "{}", sampled.display());
    let t = Table::from_csv_path(&td.path().join("S9_20%.csv")).unwrap();
    assert_eq!(t.len(), 6);
    assert_eq!(t.name(), "S9_20%");

    std::env::set_current_dir(td.path()).unwrap();
    let opts = TagsetOptions {
        filter_value: "a.xlsx".to_string(),
        ..TagsetOptions::default()
    };
    tagset_file(&tags, None, &opts, Path::new(".")).expect("tagset_file");
    let text = read_to_string(td.path().join("a.xlsx_VG.csv"));
    // Formula-like tag cells are neutralised in record exports.
    assert!(text.contains("'=S7.1+,1,fight,No definition found"), "{text}");
}

// --------------------- CLI tests ---------------------

#[test]
fn cli_significance_prints_paths() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "groups.csv", GROUPS_CSV);
    run_cli_ok_in(
        td.path(),
        &[
            "significance",
            "--input",
            "groups.csv",
            "--outdir",
            "res",
            "--prefix",
            "study",
        ],
    )
    .stdout(predicate::str::contains("study_statistics_results.csv"));
    assert!(td.path().join("res").join("study_statistics_results.csv").exists());
}

#[test]
fn cli_significance_with_explicit_sizes_and_tsv() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(
        &td,
        "groups.csv",
        "Vehicle_group,SSC_Raw,SSC_RF,LEC_Raw,LEC_RF\nBody,50,2.5,10,0.8\nTOTALS,0,0,30,3\n",
    );
    run_cli_ok_in(
        td.path(),
        &[
            "significance",
            "--input",
            "groups.csv",
            "--ssc_words",
            "20000",
            "--lec_words",
            "12500",
            "--export-format",
            "tsv",
        ],
    );
    let text = read_to_string(td.path().join("outputs").join("metaphor_statistics_results.tsv"));
    let totals = text.lines().last().unwrap();
    assert!(totals.starts_with("TOTALS\t"));
    assert!(!totals.contains("NaN") && !totals.contains("inf"));
    assert!(totals.contains("LEC uses"));
}

#[test]
fn cli_significance_missing_input_fails() {
    let td = tempdir().unwrap();
    let bad = td.path().join("does_not_exist.csv");
    run_cli_fail_in(
        td.path(),
        &["significance", "--input", bad.to_string_lossy().as_ref()],
    )
    .stderr(predicate::str::contains("Error"));
}

#[test]
fn cli_significance_missing_column_fails() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "bad.csv", "Vehicle_group,SSC_Raw\nBody,5\n");
    run_cli_fail_in(td.path(), &["significance", "--input", "bad.csv"])
        .stderr(predicate::str::contains("SSC_RF"));
    assert!(!td.path().join("outputs").join("metaphor_statistics_results.csv").exists());
}

#[test]
fn cli_sample_is_reproducible_with_seed() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "S7.csv", &full_sheet(&[("go", "V", 50), ("cat", "N", 5)]));
    run_cli_ok_in(
        td.path(),
        &["sample", "--input", "S7.csv", "--seed", "5", "--outdir", "a"],
    )
    .stdout(predicate::str::contains("S7_20%.csv"));
    run_cli_ok_in(
        td.path(),
        &["sample", "--input", "S7.csv", "--seed", "5", "--outdir", "b"],
    );
    let a = read_to_string(td.path().join("a").join("S7_20%.csv"));
    let b = read_to_string(td.path().join("b").join("S7_20%.csv"));
    assert_eq!(a, b);
    // header + 10 go + 5 cat
    assert_eq!(a.lines().count(), 16);
    assert!(a.starts_with("id,pos,item,context,code\n"));
}

#[test]
fn cli_sample_rejects_bad_fraction() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "S7.csv", &full_sheet(&[("go", "V", 5)]));
    run_cli_fail_in(
        td.path(),
        &["sample", "--input", "S7.csv", "--fraction", "1.5"],
    )
    .stderr(predicate::str::contains("fraction"));
}

#[test]
fn cli_estimate_json_summary() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "book/S1.csv", &full_sheet(&[("go", "V", 40), ("rare", "N", 2)]));
    let mut sample = String::from("id,pos,item,context,code\n");
    for i in 0..8 {
        let code = if i % 2 == 0 { "o" } else { "" };
        sample.push_str(&format!("{i},V,go,ctx {i},{code}\n"));
    }
    write_file(&td, "book/S1_20%.csv", &sample);

    run_cli_ok_in(
        td.path(),
        &[
            "estimate",
            "--input",
            "book",
            "--outdir",
            "out",
            "--export-format",
            "json",
        ],
    )
    .stdout(predicate::str::contains("TOTAL"));

    let v: Json = serde_json::from_str(&read_to_string(
        td.path().join("out").join("book").join("book_summary.json"),
    ))
    .unwrap();
    assert_eq!(v["workbook"], "book");
    let stamp = v["generated_at"].as_str().unwrap();
    assert!(Regex::new(r"^\d{4}-\d{2}-\d{2}T").unwrap().is_match(stamp));
    // "rare" is low-frequency but was never drawn: its rows stay in the HF population.
    assert_eq!(v["sheets"][0]["total_lf_rows"], 0);
    assert_eq!(v["sheets"][0]["total_hf_rows"], 42);
    // 4/8 * 42
    assert_eq!(v["hf_estimated_metaphors_total"], 21.0);
    assert_eq!(v["final_estimate_total"], 21.0);
}

#[test]
fn cli_tagset_counts_tags() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(
        &td,
        "tags.csv",
        "id,file,n,item,t1,t2\n1,a.xlsx,1,fight,S7.1+,E3-\n2,a.xlsx,2,war,E3-,\n3,b.xlsx,3,sun,W1,\n",
    );
    write_file(&td, "semtags.csv", "tag,definition\nE3-,Violent/Angry\n");
    run_cli_ok_in(
        td.path(),
        &[
            "tagset",
            "--input",
            "tags.csv",
            "--filter-value",
            "a.xlsx",
            "--definitions",
            "semtags.csv",
        ],
    );
    let text = read_to_string(td.path().join("a.xlsx_VG.csv"));
    assert!(text.starts_with("Value,Count,Strings,Definition\n"));
    assert!(text.contains("E3-,2,\"fight, war\",Violent/Angry"), "{text}");
    assert!(text.contains("S7.1+,1,fight,No definition found"), "{text}");
}
