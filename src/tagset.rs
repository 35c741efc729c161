//! Tally of candidate semantic tags for one labelled subset of a sheet.
//!
//! Rows are filtered on one column; every non-empty cell from the first tag
//! column onwards counts as a tag occurrence for that row's item.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::export::TabularRecord;
use crate::table::{ColumnRef, Table, cell};

pub const NO_DEFINITION: &str = "No definition found";

#[derive(Debug, Clone, PartialEq)]
pub struct TagsetOptions {
    pub filter_col: ColumnRef,
    pub filter_value: String,
    pub item_col: ColumnRef,
    pub tags_start_col: ColumnRef,
}

impl Default for TagsetOptions {
    fn default() -> Self {
        Self {
            filter_col: ColumnRef::Position(2),
            filter_value: String::new(),
            item_col: ColumnRef::Position(4),
            tags_start_col: ColumnRef::Position(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagCount {
    #[serde(rename = "Value")]
    pub tag: String,
    #[serde(rename = "Count")]
    pub count: usize,
    #[serde(rename = "Strings")]
    pub strings: Vec<String>,
    #[serde(rename = "Definition")]
    pub definition: String,
}

impl TabularRecord for TagCount {
    fn headers() -> Vec<&'static str> {
        vec!["Value", "Count", "Strings", "Definition"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.tag.clone(),
            self.count.to_string(),
            self.strings.join(", "),
            self.definition.clone(),
        ]
    }
}

/// Tag → definition lookup from the first two columns of `table`.
pub fn load_definitions(table: &Table) -> Result<HashMap<String, String>> {
    if table.headers().len() < 2 {
        return Err(Error::schema(
            format!("sheet '{}'", table.name()),
            "definitions need two columns (tag, definition)",
        ));
    }
    Ok(table
        .rows()
        .iter()
        .filter_map(|row| {
            let tag = cell(row, 0)?;
            Some((tag.to_string(), cell(row, 1).unwrap_or_default().to_string()))
        })
        .collect())
}

/// Count tags over the rows whose filter cell equals `opts.filter_value`.
///
/// Tags are returned in first-seen order.
pub fn tally_tags(
    table: &Table,
    opts: &TagsetOptions,
    definitions: &HashMap<String, String>,
) -> Result<Vec<TagCount>> {
    let filter_idx = table.resolve(&opts.filter_col)?;
    let item_idx = table.resolve(&opts.item_col)?;
    let start = table.resolve(&opts.tags_start_col)?;

    let mut order: Vec<String> = Vec::new();
    let mut tally: HashMap<String, (usize, Vec<String>)> = HashMap::new();
    for row in table
        .rows()
        .iter()
        .filter(|r| cell(r, filter_idx) == Some(opts.filter_value.as_str()))
    {
        let item = cell(row, item_idx).unwrap_or_default();
        for tag in row.iter().skip(start).filter_map(|c| c.as_deref()) {
            let entry = tally.entry(tag.to_string()).or_insert_with(|| {
                order.push(tag.to_string());
                (0, Vec::new())
            });
            entry.0 += 1;
            entry.1.push(item.to_string());
        }
    }

    Ok(order
        .into_iter()
        .map(|tag| {
            let (count, strings) = tally.remove(&tag).unwrap_or_default();
            let definition = definitions
                .get(&tag)
                .cloned()
                .unwrap_or_else(|| NO_DEFINITION.to_string());
            TagCount {
                tag,
                count,
                strings,
                definition,
            }
        })
        .collect())
}
