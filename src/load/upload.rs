//! Bulk loading of CSV files and in-memory tables.
//!
//! The load path is: optional in-place null normalization, header
//! resolution, schema resolution (explicit columns win over inference),
//! destination DDL, then one call into the external importer. Two side
//! effects are deliberate and documented: the source CSV is rewritten
//! during normalization, and `replace_table` drops and recreates the
//! destination.

use std::path::Path;

use sqlx::MySqlPool;

use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::importer::{ImportRequest, TableImporter};
use crate::load::clean::{self, HeaderMode};
use crate::load::schema::{self, ColumnSpec};
use crate::table::Table;

/// Options for a bulk load.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Destination schema; defaults to the configured database.
    pub schema: Option<String>,
    /// Header presence: sniffed by default.
    pub header: HeaderMode,
    /// Drop and recreate the destination table first.
    pub replace_table: bool,
    /// Normalize null-like cells in place before loading.
    pub clean: bool,
    /// Replace rows colliding on a unique key instead of failing.
    pub replace_duplicates: bool,
    /// Explicit column schema; authoritative when present.
    pub columns: Option<Vec<ColumnSpec>>,
    /// CSV dialect handed to the importer.
    pub dialect: String,
    /// Importer thread count; defaults to the client option.
    pub threads: Option<usize>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            schema: None,
            header: HeaderMode::Auto,
            replace_table: false,
            clean: true,
            replace_duplicates: false,
            columns: None,
            dialect: "csv-unix".to_string(),
            threads: None,
        }
    }
}

/// Bulk-load a CSV file into `table`.
pub(crate) async fn upload_csv(
    pool: &MySqlPool,
    importer: &dyn TableImporter,
    client_options: &ClientOptions,
    default_schema: &str,
    path: &Path,
    table: &str,
    options: &UploadOptions,
) -> Result<()> {
    if !path.is_file() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let schema_name = options.schema.as_deref().unwrap_or(default_schema);

    if options.clean {
        clean::normalize_nulls(path)?;
    }

    let header = clean::resolve_header(path, options.header)?;

    // Explicit schema is authoritative; the header flag then only decides
    // how many leading rows the importer skips.
    let columns = match &options.columns {
        Some(explicit) => explicit.clone(),
        None => schema::infer_schema(path, header)?,
    };

    create_destination(pool, schema_name, table, &columns, options.replace_table).await?;

    let request = ImportRequest {
        path: path.to_path_buf(),
        schema: schema_name.to_string(),
        table: table.to_string(),
        columns: columns.iter().map(|c| c.name.clone()).collect(),
        dialect: options.dialect.clone(),
        threads: options.threads.unwrap_or(client_options.import_threads),
        skip_rows: if header { 1 } else { 0 },
        replace_duplicates: options.replace_duplicates,
    };
    let outcome = importer.import(&request).await?;
    if !outcome.stdout.is_empty() {
        log::debug!("importer output: {}", outcome.stdout.trim_end());
    }

    log::info!(
        "imported {} into {}.{} ({} columns)",
        path.display(),
        schema_name,
        table,
        columns.len()
    );
    Ok(())
}

/// Spool an in-memory table to a temporary CSV and bulk-load it.
///
/// Cells are written in canonical form (nulls as `\N`), so the cleaning
/// pass is skipped and the header is known to be present.
pub(crate) async fn upload_table(
    pool: &MySqlPool,
    importer: &dyn TableImporter,
    client_options: &ClientOptions,
    default_schema: &str,
    data: &Table,
    table: &str,
    options: &UploadOptions,
) -> Result<()> {
    if data.is_empty() {
        log::warn!("upload of empty table into {table} skipped");
        return Ok(());
    }

    let tmp = tempfile::Builder::new()
        .prefix("df_")
        .suffix(".csv")
        .tempfile()?;
    data.write_csv_path(tmp.path())?;

    let spool_options = UploadOptions {
        header: HeaderMode::Present,
        clean: false,
        ..options.clone()
    };
    upload_csv(
        pool,
        importer,
        client_options,
        default_schema,
        tmp.path(),
        table,
        &spool_options,
    )
    .await
    // The temp file is removed when `tmp` drops, success or not.
}

/// Ensure schema and table exist, optionally dropping the table first.
pub(crate) async fn create_destination(
    pool: &MySqlPool,
    schema_name: &str,
    table: &str,
    columns: &[ColumnSpec],
    replace: bool,
) -> Result<()> {
    sqlx::query(&format!(
        "CREATE DATABASE IF NOT EXISTS {}",
        schema::quote_ident(schema_name)
    ))
    .execute(pool)
    .await?;

    if replace {
        log::info!("dropping {}.{} before reload", schema_name, table);
        sqlx::query(&format!(
            "DROP TABLE IF EXISTS {}.{}",
            schema::quote_ident(schema_name),
            schema::quote_ident(table)
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query(&schema::render_create_table(schema_name, table, columns))
        .execute(pool)
        .await?;
    Ok(())
}
