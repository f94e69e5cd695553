//! Cached MySQL queries and bulk/incremental CSV loading.
//!
//! A thin convenience layer for analyst workflows against a MySQL
//! warehouse:
//!
//! - [`DbClient::run_sql`] executes SQL and returns a [`Table`], serving
//!   repeat queries from a 24-hour on-disk cache.
//! - [`DbClient::upload_csv`] / [`DbClient::upload_table`] bulk-load data
//!   through MySQL Shell's parallel `util import-table`, normalizing
//!   null-like cells to the `\N` sentinel and optionally recreating the
//!   destination with an inferred schema.
//! - [`DbClient::append_csv`] / [`DbClient::append_table`] merge new rows
//!   incrementally, either via a staging table with a duplicate-skipping
//!   insert or via a watermark filter on the ordering key.
//!
//! Credentials come from `DB_USER`, `DB_PASS`, `DB_HOST`, `DB_NAME` (and
//! optionally `DB_PORT`), loaded once at construction; see
//! [`config::DbConfig`].

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod importer;
pub mod load;
pub mod pool;
pub mod queries;
pub mod query;
pub mod table;

pub use cache::QueryCache;
pub use client::DbClient;
pub use config::{ClientOptions, DbConfig};
pub use error::{Error, Result};
pub use importer::{ImportError, ImportOutcome, ImportRequest, TableImporter};
pub use load::{AppendMode, ColumnSpec, HeaderMode, UploadOptions};
pub use queries::QueryStore;
pub use query::QueryOptions;
pub use table::{NULL_TOKEN, Table, Value};

use env_logger::Env;
use std::sync::Once;

static LOGGER: Once = Once::new();

/// Initialize `env_logger` once; safe to call from multiple entry points.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info"))
            .init();
    });
}
