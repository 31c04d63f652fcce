use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Five-way type tag attached to discovered columns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Datetime,
    Str,
}

impl ColumnType {
    pub fn as_str(&self) -> &str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
            ColumnType::Datetime => "datetime",
            ColumnType::Str => "str",
        }
    }

    /// Parse a type tag; anything unrecognized is `Str`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "int" => ColumnType::Int,
            "float" => ColumnType::Float,
            "bool" => ColumnType::Bool,
            "datetime" => ColumnType::Datetime,
            _ => ColumnType::Str,
        }
    }
}

/// Column name to type tag, in origin schema order.
pub type ColumnSchema = IndexMap<String, ColumnType>;

/// A tabular extraction result.
///
/// Cells are string-serialized origin values; `None` marks an origin null or
/// empty cell and is omitted when rows are converted for the stream sink.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl DataTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Project the table onto `keep`, preserving the order of `keep`.
    /// Columns in `keep` that do not exist are dropped silently.
    pub fn select(&self, keep: &[String]) -> DataTable {
        let indices: Vec<usize> = keep
            .iter()
            .filter_map(|name| self.columns.iter().position(|c| c == name))
            .collect();

        DataTable {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row.get(i).cloned().flatten()).collect())
                .collect(),
        }
    }

    /// Convert one row into the stream sink shape, omitting null and empty
    /// cells.
    pub fn row_map(&self, index: usize) -> HashMap<String, String> {
        let mut map = HashMap::new();
        if let Some(row) = self.rows.get(index) {
            for (name, cell) in self.columns.iter().zip(row.iter()) {
                if let Some(value) = cell {
                    if !value.is_empty() {
                        map.insert(name.clone(), value.clone());
                    }
                }
            }
        }
        map
    }
}

/// Intersection of an optional caller allow-list with the discovered
/// columns, in discovered (origin) order. Unknown allow-list entries are
/// dropped silently; no allow-list means every discovered column.
pub fn clean_columns(discovered: Vec<String>, allow: Option<&[String]>) -> Vec<String> {
    match allow {
        Some(allow) if !allow.is_empty() => discovered
            .into_iter()
            .filter(|c| allow.iter().any(|a| a == c))
            .collect(),
        _ => discovered,
    }
}
