//! Output formats and file writing.
//!
//! Everything is rendered to memory first and then written through a temporary
//! file in the target directory that is renamed into place, so a failed run
//! never leaves a half-written result behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::table::Table;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Txt,
    Csv,
    Tsv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }
}

/// A row type with a fixed column layout.
pub trait TabularRecord {
    fn headers() -> Vec<&'static str>;
    fn cells(&self) -> Vec<String>;
}

/// Neutralise spreadsheet formula injection in text cells.
///
/// Text starting with `=`, `+`, `-`, `@`, tab or carriage return gets a leading
/// apostrophe. Numeric cells such as `-1.25` are left unchanged.
pub fn csv_safe_cell(cell: &str) -> String {
    let risky = matches!(
        cell.chars().next(),
        Some('=') | Some('+') | Some('-') | Some('@') | Some('\t') | Some('\r')
    );
    if risky && cell.trim().parse::<f64>().is_err() {
        format!("'{cell}")
    } else {
        cell.to_string()
    }
}

fn render_delimited<T: TabularRecord>(records: &[T], delimiter: u8) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    wtr.write_record(T::headers())
        .map_err(|e| Error::csv("<export>", e))?;
    for r in records {
        wtr.write_record(r.cells().iter().map(|c| csv_safe_cell(c)))
            .map_err(|e| Error::csv("<export>", e))?;
    }
    wtr.into_inner()
        .map_err(|e| Error::io("<export>", std::io::Error::other(e.to_string())))
}

/// Plain-text grid for terminals and `.txt` exports.
pub fn render_text_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, c) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(c.chars().count());
            }
        }
    }
    let sep: String = widths
        .iter()
        .map(|w| "-".repeat(w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let sep = format!("+{sep}+\n");
    let mut out = sep.clone();
    out.push_str(&text_line(headers.iter().copied(), &widths));
    out.push_str(&sep);
    for row in rows {
        out.push_str(&text_line(row.iter().map(String::as_str), &widths));
    }
    out.push_str(&sep);
    out
}

fn text_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let parts: Vec<String> = cells
        .zip(widths)
        .map(|(c, w)| format!(" {c}{} ", " ".repeat(w.saturating_sub(c.chars().count()))))
        .collect();
    format!("|{}|\n", parts.join("|"))
}

/// Render records in the requested format.
pub fn render_records<T>(records: &[T], format: ExportFormat) -> Result<Vec<u8>>
where
    T: TabularRecord + Serialize,
{
    match format {
        ExportFormat::Csv => render_delimited(records, b','),
        ExportFormat::Tsv => render_delimited(records, b'\t'),
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(records)?),
        ExportFormat::Txt => {
            let rows: Vec<Vec<String>> = records.iter().map(|r| r.cells()).collect();
            Ok(render_text_table(&T::headers(), &rows).into_bytes())
        }
    }
}

/// Render a sheet as CSV, cells verbatim so it can be read back.
pub fn render_table(table: &Table) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    table.write_csv(&mut buf)?;
    Ok(buf)
}

/// Write `bytes` to a temporary file in the directory of `path`.
fn stage(path: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| Error::io(&dir, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io(path, e))?;
    tmp.flush().map_err(|e| Error::io(path, e))?;
    Ok(tmp)
}

/// Write `bytes` to `path` via a temporary file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    stage(path, bytes)?
        .persist(path)
        .map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// Outputs of one unit of work, written together once everything rendered.
#[derive(Debug, Default)]
pub struct OutputBatch {
    files: Vec<(PathBuf, Vec<u8>)>,
}

impl OutputBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf, bytes: Vec<u8>) {
        self.files.push((path, bytes));
    }

    /// Write every file; returns the written paths in insertion order.
    ///
    /// All files are staged as temporaries first and renamed into place only
    /// once every one of them was written, so a failed write leaves no target
    /// touched. The final renames are not atomic as a group: an error there
    /// (rare, same directory) can leave earlier targets already replaced.
    pub fn commit(self) -> Result<Vec<PathBuf>> {
        let mut staged = Vec::with_capacity(self.files.len());
        for (path, bytes) in self.files {
            let tmp = stage(&path, &bytes)?;
            staged.push((path, tmp));
        }
        let mut written = Vec::with_capacity(staged.len());
        for (path, tmp) in staged {
            tmp.persist(&path).map_err(|e| Error::io(&path, e.error))?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Make a label usable as a file name component.
pub fn sanitize_file_stem(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '%' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "output".to_string()
    } else {
        cleaned
    }
}
