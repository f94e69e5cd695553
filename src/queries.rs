//! Named query files.
//!
//! Analysts keep shared SQL in a directory of `.sql` files; a
//! [`QueryStore`] resolves them by name so call sites stay free of paths.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Directory of named `.sql` files.
#[derive(Debug, Clone)]
pub struct QueryStore {
    base: PathBuf,
}

impl QueryStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Read the SQL text for `name` (without extension). A UTF-8 BOM, which
    /// Windows SQL editors like to prepend, is stripped.
    pub fn get(&self, name: &str) -> Result<String> {
        let path = self.base.join(format!("{name}.sql"));
        let text = std::fs::read_to_string(&path)
            .map_err(|_| Error::QueryNotFound(path.clone()))?;
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_named_queries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("daily.sql"), "SELECT 1").unwrap();

        let store = QueryStore::new(dir.path());
        assert_eq!(store.get("daily").unwrap(), "SELECT 1");
        assert!(matches!(
            store.get("missing"),
            Err(Error::QueryNotFound(_))
        ));
    }

    #[test]
    fn strips_utf8_bom() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bom.sql"), "\u{feff}SELECT 2").unwrap();

        let store = QueryStore::new(dir.path());
        assert_eq!(store.get("bom").unwrap(), "SELECT 2");
    }
}
