//! In-memory tables loaded from CSV sheets.
//!
//! A [`Table`] is a header row plus an ordered list of rows. Empty cells are
//! stored as `None` so that a missing annotation and an absent column value are
//! treated the same way everywhere downstream.

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// One table row; `None` marks an empty cell.
pub type Row = Vec<Option<String>>;

/// Column reference by header name or by 1-based position.
///
/// Parsed from CLI strings: `"3"` is the third column, `"Item"` is the column
/// whose header is `Item`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Name(String),
    Position(usize),
}

impl FromStr for ColumnRef {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("column reference must not be empty".to_string());
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            let pos: usize = s
                .parse()
                .map_err(|e| format!("invalid column position '{s}': {e}"))?;
            if pos == 0 {
                return Err("column positions are 1-based".to_string());
            }
            Ok(ColumnRef::Position(pos))
        } else {
            Ok(ColumnRef::Name(s.to_string()))
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Name(n) => write!(f, "'{n}'"),
            ColumnRef::Position(p) => write!(f, "#{p}"),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(s: &str) -> Self {
        ColumnRef::Name(s.to_string())
    }
}

impl From<usize> for ColumnRef {
    fn from(p: usize) -> Self {
        ColumnRef::Position(p)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Same header, no rows.
    pub fn empty_like(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.headers.clone(), Vec::new())
    }

    /// Load a CSV file; the sheet name is the file stem.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        Self::from_csv_reader(name, file).map_err(|e| match e {
            Error::Csv { source, .. } => Error::csv(path, source),
            other => other,
        })
    }

    /// Load CSV from any reader. The first record is the header row.
    pub fn from_csv_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self> {
        let name = name.into();
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| Error::csv(&name, e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.is_empty() {
            return Err(Error::schema(format!("sheet '{name}'"), "missing header row"));
        }
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|e| Error::csv(&name, e))?;
            let row: Row = record
                .iter()
                .map(|cell| {
                    if cell.trim().is_empty() {
                        None
                    } else {
                        Some(cell.to_string())
                    }
                })
                .collect();
            rows.push(row);
        }
        Ok(Self {
            name,
            headers,
            rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Resolve a column reference to a 0-based index.
    pub fn resolve(&self, col: &ColumnRef) -> Result<usize> {
        match col {
            ColumnRef::Position(p) => {
                if *p >= 1 && *p <= self.headers.len() {
                    Ok(p - 1)
                } else {
                    Err(Error::schema(
                        format!("sheet '{}'", self.name),
                        format!(
                            "column {col} is out of range for a sheet with {} columns",
                            self.headers.len()
                        ),
                    ))
                }
            }
            ColumnRef::Name(n) => self.headers.iter().position(|h| h == n).ok_or_else(|| {
                Error::schema(
                    format!("sheet '{}'", self.name),
                    format!("column {col} not found; available columns: {:?}", self.headers),
                )
            }),
        }
    }

    /// Write header and rows as CSV. Empty cells are written as empty fields.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        wtr.write_record(&self.headers)
            .map_err(|e| Error::csv(&self.name, e))?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))
                .map_err(|e| Error::csv(&self.name, e))?;
        }
        wtr.flush().map_err(|e| Error::io(&self.name, e))?;
        Ok(())
    }
}

/// Cell text at `idx`, `None` for empty or missing cells.
pub fn cell(row: &Row, idx: usize) -> Option<&str> {
    row.get(idx).and_then(|c| c.as_deref())
}
