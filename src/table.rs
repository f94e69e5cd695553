//! In-memory tabular values.
//!
//! [`Table`] is the result type of every query and the input of every
//! dataframe-style load: ordered named columns over rows of [`Value`] cells.
//! It has no identity beyond its content and is rebuilt on every query.
//!
//! The two-character sequence `\N` is the canonical null marker at the CSV
//! boundary: it maps to [`Value::Null`] in memory and to SQL `NULL` in the
//! destination database.

use std::fmt;
use std::io::Write;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Canonical null sentinel on the wire-format boundary.
pub const NULL_TOKEN: &str = r"\N";

/// Cell strings treated as null-equivalent during normalization, compared
/// case-insensitively. The empty string is handled separately.
pub const NULL_MARKERS: [&str; 4] = ["null", "none", "nan", "n/a"];

/// True when a trimmed cell should be normalized to the null sentinel.
pub fn is_null_marker(cell: &str) -> bool {
    cell.is_empty()
        || cell == NULL_TOKEN
        || NULL_MARKERS
            .iter()
            .any(|marker| cell.eq_ignore_ascii_case(marker))
}

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the cell the way it is written to CSV: nulls become `\N`.
    pub fn to_field(&self) -> String {
        match self {
            Value::Null => NULL_TOKEN.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Text(v) => v.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_field())
    }
}

/// Named columns over rows of cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Index of a named column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Write the table as CSV: header row first, nulls as `\N`.
    ///
    /// This is the spool format handed to the bulk importer, so cells are
    /// written in canonical form and need no further normalization.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(&self.columns)?;
        for row in &self.rows {
            out.write_record(row.iter().map(|cell| cell.to_field()))?;
        }
        out.flush()?;
        Ok(())
    }

    /// Write the table as CSV to a file path.
    pub fn write_csv_path(&self, path: &Path) -> Result<(), csv::Error> {
        let file = std::fs::File::create(path).map_err(csv::Error::from)?;
        self.write_csv(file)
    }

    /// Uniform sample of at most `k` rows via reservoir selection, preserving
    /// the column layout. With `k >= len` this is a copy.
    pub fn reservoir_sample<R: Rng>(&self, k: usize, rng: &mut R) -> Table {
        let mut reservoir: Vec<Vec<Value>> = Vec::with_capacity(k.min(self.rows.len()));
        for (i, row) in self.rows.iter().enumerate() {
            if i < k {
                reservoir.push(row.clone());
            } else {
                let j = rng.gen_range(0..=i);
                if j < k {
                    reservoir[j] = row.clone();
                }
            }
        }
        Table {
            columns: self.columns.clone(),
            rows: reservoir,
        }
    }
}
