//! Bulk and incremental loading.
//!
//! - **`clean`**: in-place null normalization and header sniffing.
//! - **`schema`**: column type inference and destination DDL.
//! - **`upload`**: the bulk load path over the external importer.
//! - **`append`**: staging-table merge and watermark filtering.

pub mod append;
pub mod clean;
pub mod schema;
pub mod upload;

pub use append::AppendMode;
pub use clean::HeaderMode;
pub use schema::ColumnSpec;
pub use upload::UploadOptions;
