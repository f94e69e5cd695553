//! Column schema inference and DDL rendering.
//!
//! Types are guessed from a bounded sample of rows, mirroring what the
//! destination accepts: integer widths by observed range, DOUBLE for
//! anything fractional, DATE/DATETIME for ISO-shaped strings, and
//! VARCHAR/TEXT as the fallback with a 255-character cutover. Cells equal
//! to the null sentinel never participate in classification, and a column
//! that defies classification stays textual rather than being coerced:
//! a bad cell should fail loudly downstream, not vanish.

use std::path::Path;
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::error::Result;
use crate::table::is_null_marker;

/// Rows examined when guessing column types.
pub const SAMPLE_ROWS: usize = 20_000;

/// One destination column: sanitized name plus SQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: String,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
        }
    }
}

struct ColumnStats {
    non_null: u64,
    all_int: bool,
    all_float: bool,
    all_bool: bool,
    all_date: bool,
    all_datetime: bool,
    min_int: i64,
    max_int: i64,
    max_len: usize,
}

impl ColumnStats {
    fn new() -> Self {
        Self {
            non_null: 0,
            all_int: true,
            all_float: true,
            all_bool: true,
            all_date: true,
            all_datetime: true,
            min_int: i64::MAX,
            max_int: i64::MIN,
            max_len: 0,
        }
    }

    fn observe(&mut self, cell: &str) {
        let cell = cell.trim();
        if is_null_marker(cell) {
            return;
        }
        self.non_null += 1;
        self.max_len = self.max_len.max(cell.chars().count());

        match cell.parse::<i64>() {
            Ok(v) => {
                self.min_int = self.min_int.min(v);
                self.max_int = self.max_int.max(v);
            }
            Err(_) => self.all_int = false,
        }
        if cell.parse::<f64>().is_err() {
            self.all_float = false;
        }
        if !matches!(cell.to_ascii_lowercase().as_str(), "true" | "false" | "0" | "1") {
            self.all_bool = false;
        }
        if NaiveDate::parse_from_str(cell, "%Y-%m-%d").is_err() {
            self.all_date = false;
        }
        if NaiveDateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S").is_err()
            && NaiveDateTime::parse_from_str(cell, "%Y-%m-%dT%H:%M:%S").is_err()
        {
            self.all_datetime = false;
        }
    }

    fn sql_type(&self) -> String {
        if self.non_null == 0 {
            return "TEXT".to_string();
        }
        if self.all_bool {
            return "TINYINT UNSIGNED".to_string();
        }
        if self.all_int {
            return match (self.min_int, self.max_int) {
                (min, max) if min >= -128 && max <= 127 => "TINYINT",
                (min, max) if min >= -32_768 && max <= 32_767 => "SMALLINT",
                (min, max) if min >= -2_147_483_648 && max <= 2_147_483_647 => "INT",
                _ => "BIGINT",
            }
            .to_string();
        }
        if self.all_float {
            return "DOUBLE".to_string();
        }
        if self.all_date {
            return "DATE".to_string();
        }
        if self.all_datetime {
            return "DATETIME".to_string();
        }
        if self.max_len > 255 {
            "TEXT".to_string()
        } else {
            format!("VARCHAR({})", self.max_len.max(1))
        }
    }
}

/// Guess a column schema from the first [`SAMPLE_ROWS`] data rows of the
/// file. With `header` false, columns are named `col0..colN`.
pub fn infer_schema(path: &Path, header: bool) -> Result<Vec<ColumnSpec>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut names: Vec<String> = Vec::new();
    let mut stats: Vec<ColumnStats> = Vec::new();
    let mut record = csv::StringRecord::new();
    let mut data_rows = 0usize;
    let mut first = true;

    while reader.read_record(&mut record)? {
        if first {
            first = false;
            if header {
                names = record.iter().map(|c| c.trim().to_string()).collect();
                continue;
            }
            names = (0..record.len()).map(|i| format!("col{i}")).collect();
        }
        while stats.len() < record.len().max(names.len()) {
            stats.push(ColumnStats::new());
        }
        for (i, cell) in record.iter().enumerate() {
            stats[i].observe(cell);
        }
        data_rows += 1;
        if data_rows >= SAMPLE_ROWS {
            break;
        }
    }

    while names.len() < stats.len() {
        names.push(format!("col{}", names.len()));
    }
    while stats.len() < names.len() {
        stats.push(ColumnStats::new());
    }

    let specs: Vec<ColumnSpec> = names
        .into_iter()
        .zip(stats.iter())
        .map(|(name, stat)| ColumnSpec::new(name, stat.sql_type()))
        .collect();

    log::debug!(
        "inferred {} columns from {} sampled rows of {}",
        specs.len(),
        data_rows,
        path.display()
    );
    Ok(sanitize_names(specs))
}

fn ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Replace column names that are not plain identifiers with `colN`,
/// deduplicating against earlier names.
pub fn sanitize_names(specs: Vec<ColumnSpec>) -> Vec<ColumnSpec> {
    let mut used: Vec<String> = Vec::new();
    let mut out = Vec::with_capacity(specs.len());

    for (i, spec) in specs.into_iter().enumerate() {
        let mut name = if ident_re().is_match(&spec.name) {
            spec.name
        } else {
            format!("col{i}")
        };
        let mut n = i;
        while used.contains(&name) {
            n += 1;
            name = format!("col{n}");
        }
        used.push(name.clone());
        out.push(ColumnSpec::new(name, spec.sql_type));
    }
    out
}

/// Backtick-quote an identifier, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Render `CREATE TABLE IF NOT EXISTS` DDL for the destination.
pub fn render_create_table(schema: &str, table: &str, columns: &[ColumnSpec]) -> String {
    let cols = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type))
        .collect::<Vec<_>>()
        .join(",\n  ");
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} (\n  {}\n) ENGINE=InnoDB",
        quote_ident(schema),
        quote_ident(table),
        cols
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    fn types(specs: &[ColumnSpec]) -> Vec<&str> {
        specs.iter().map(|s| s.sql_type.as_str()).collect()
    }

    #[test]
    fn infers_integer_widths_by_range() {
        let (_dir, path) = write_file("a,b,c,d\n1,300,70000,3000000000\n-5,2,3,4\n");
        let specs = infer_schema(&path, true).unwrap();
        assert_eq!(types(&specs), ["TINYINT", "SMALLINT", "INT", "BIGINT"]);
    }

    #[test]
    fn infers_floats_dates_and_strings() {
        let (_dir, path) = write_file(
            "price,day,stamp,label\n1.5,2024-01-02,2024-01-02 10:00:00,hello\n2.25,2024-01-03,2024-01-03 11:30:00,world\n",
        );
        let specs = infer_schema(&path, true).unwrap();
        assert_eq!(types(&specs), ["DOUBLE", "DATE", "DATETIME", "VARCHAR(5)"]);
    }

    #[test]
    fn null_cells_do_not_vote() {
        let (_dir, path) = write_file("v\n\\N\n7\nnull\n");
        let specs = infer_schema(&path, true).unwrap();
        assert_eq!(types(&specs), ["TINYINT"]);
    }

    #[test]
    fn all_null_column_stays_text() {
        let (_dir, path) = write_file("v\n\\N\n\\N\n");
        let specs = infer_schema(&path, true).unwrap();
        assert_eq!(types(&specs), ["TEXT"]);
    }

    #[test]
    fn bool_columns_become_unsigned_tinyint() {
        let (_dir, path) = write_file("flag\ntrue\nfalse\n");
        let specs = infer_schema(&path, true).unwrap();
        assert_eq!(types(&specs), ["TINYINT UNSIGNED"]);
    }

    #[test]
    fn headerless_files_get_generated_names() {
        let (_dir, path) = write_file("1,x\n2,y\n");
        let specs = infer_schema(&path, false).unwrap();
        assert_eq!(specs[0].name, "col0");
        assert_eq!(specs[1].name, "col1");
    }

    #[test]
    fn sanitize_replaces_bad_names_and_dedupes() {
        let specs = vec![
            ColumnSpec::new("ok_name", "INT"),
            ColumnSpec::new("bad name!", "INT"),
            ColumnSpec::new("col1", "INT"),
        ];
        let out = sanitize_names(specs);
        let names: Vec<&str> = out.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names[0], "ok_name");
        assert_eq!(names[1], "col1");
        // The literal col1 collides with the sanitized one and moves past
        // its own index.
        assert_eq!(names[2], "col3");
    }

    #[test]
    fn ddl_quotes_identifiers() {
        let ddl = render_create_table(
            "wh",
            "t",
            &[
                ColumnSpec::new("id", "BIGINT"),
                ColumnSpec::new("name", "VARCHAR(16)"),
            ],
        );
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS `wh`.`t` (\n  `id` BIGINT,\n  `name` VARCHAR(16)\n) ENGINE=InnoDB"
        );
    }

    #[test]
    fn quote_ident_doubles_backticks() {
        assert_eq!(quote_ident("a`b"), "`a``b`");
    }
}
