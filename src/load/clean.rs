//! CSV null normalization and header detection.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::table::{NULL_TOKEN, is_null_marker};

/// Rows between progress log lines during a rewrite.
const PROGRESS_EVERY: u64 = 100_000;

/// Whether the input carries a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderMode {
    /// Sniff the first record.
    #[default]
    Auto,
    Present,
    Absent,
}

/// Rewrite `src` in place so that empty cells and common null-like strings
/// become the `\N` sentinel, trimming surrounding whitespace from every
/// cell. Returns the number of records written.
///
/// The rewrite goes through a temporary file in the same directory and is
/// swapped in atomically, so a crash mid-rewrite leaves the original file
/// intact. Mutating the source file is a documented side effect of the
/// bulk loader, not an accident.
pub fn normalize_nulls(src: &Path) -> Result<u64> {
    let parent = src.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::Builder::new()
        .prefix("tmp_")
        .suffix(".csv")
        .tempfile_in(parent)?;

    let mut rows = 0u64;
    {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(src)?;
        let mut writer = csv::Writer::from_writer(tmp.as_file());

        let mut record = csv::StringRecord::new();
        while reader.read_record(&mut record)? {
            writer.write_record(record.iter().map(|cell| {
                let cell = cell.trim();
                if is_null_marker(cell) { NULL_TOKEN } else { cell }
            }))?;
            rows += 1;
            if rows % PROGRESS_EVERY == 0 {
                log::debug!("normalized {rows} rows of {}", src.display());
            }
        }
        writer.flush()?;
    }

    tmp.persist(src)
        .map_err(|e| Error::Io(e.error))?;
    log::info!("normalized {rows} rows in {}", src.display());
    Ok(rows)
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap())
}

/// A field that parses as a number or an ISO date is data, not a header
/// label.
fn looks_like_data(field: &str) -> bool {
    let field = field.trim();
    (!field.is_empty() && field.parse::<f64>().is_ok()) || date_re().is_match(field)
}

/// Sniff whether the first record is a header: it is unless any field looks
/// like data.
pub fn detect_header(path: &Path) -> Result<bool> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut first = csv::StringRecord::new();
    if !reader.read_record(&mut first)? {
        // An empty file has nothing to skip either way.
        return Ok(false);
    }

    let header = !first.iter().any(looks_like_data);
    log::debug!("auto-detect header for {}: {header}", path.display());
    Ok(header)
}

/// Resolve a [`HeaderMode`] against the file.
pub fn resolve_header(path: &Path, mode: HeaderMode) -> Result<bool> {
    match mode {
        HeaderMode::Present => Ok(true),
        HeaderMode::Absent => Ok(false),
        HeaderMode::Auto => detect_header(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn normalize_replaces_markers_and_trims() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "in.csv",
            "id,name,score\n1, alpha ,NULL\n2,,3.5\n3,n/a, keep me \n",
        );

        let rows = normalize_nulls(&path).unwrap();
        assert_eq!(rows, 4);

        let out = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            out,
            "id,name,score\n1,alpha,\\N\n2,\\N,3.5\n3,\\N,keep me\n"
        );
    }

    #[test]
    fn normalize_leaves_regular_values_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "in.csv", "a,b\nnully,0\n");

        normalize_nulls(&path).unwrap();
        let out = std::fs::read_to_string(&path).unwrap();
        assert_eq!(out, "a,b\nnully,0\n");
    }

    #[test]
    fn header_detected_when_first_row_is_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "in.csv", "id,name,when\n1,alpha,2024-01-02\n");
        assert!(detect_header(&path).unwrap());
    }

    #[test]
    fn header_rejected_when_first_row_has_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "in.csv", "1,alpha\n2,beta\n");
        assert!(!detect_header(&path).unwrap());
    }

    #[test]
    fn header_rejected_when_first_row_has_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "in.csv", "2024-01-02,alpha\n");
        assert!(!detect_header(&path).unwrap());
    }

    #[test]
    fn forced_modes_skip_sniffing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "in.csv", "1,2\n");
        assert!(resolve_header(&path, HeaderMode::Present).unwrap());
        assert!(!resolve_header(&path, HeaderMode::Absent).unwrap());
    }
}
