//! Incremental loading: staging-table merge and watermark filtering.
//!
//! Both modes guarantee that existing destination rows are never
//! overwritten. Staging mode routes new data through an ephemeral table and
//! merges with a duplicate-skipping insert; the staging table is dropped on
//! every exit path. Watermark mode skips the staging table entirely by
//! filtering the input against the destination's current maximum key.

use std::path::Path;

use sqlx::MySqlPool;
use uuid::Uuid;

use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::importer::TableImporter;
use crate::load::clean::{self, HeaderMode};
use crate::load::schema::{ColumnSpec, quote_ident};
use crate::load::upload::{UploadOptions, upload_csv};
use crate::table::{NULL_TOKEN, Table, is_null_marker};

/// Merge strategy for incremental loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppendMode {
    /// Bulk-load into a staging table, then insert only rows whose key
    /// combination is absent from the destination.
    #[default]
    Staging,
    /// Skip rows at or below the destination's current maximum of the first
    /// key column, then bulk-load the remainder directly.
    Watermark,
}

/// Append rows from a CSV file into an existing table.
///
/// `key_cols` is the ordered set of columns forming the logical uniqueness
/// constraint; in watermark mode only the first entry is consulted.
pub(crate) async fn append_csv(
    pool: &MySqlPool,
    importer: &dyn TableImporter,
    client_options: &ClientOptions,
    default_schema: &str,
    path: &Path,
    table: &str,
    key_cols: &[String],
    mode: AppendMode,
    options: &UploadOptions,
) -> Result<()> {
    if key_cols.is_empty() {
        return Err(Error::Config("append requires at least one key column".into()));
    }
    if !path.is_file() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let schema_name = options.schema.as_deref().unwrap_or(default_schema).to_string();

    if count_data_rows(path, options.header)? == 0 {
        log::info!("append into {}.{} skipped: no data rows", schema_name, table);
        return Ok(());
    }

    match mode {
        AppendMode::Staging => {
            append_staging(
                pool, importer, client_options, &schema_name, path, table, key_cols, options,
            )
            .await
        }
        AppendMode::Watermark => {
            append_watermark(
                pool, importer, client_options, &schema_name, path, table, key_cols, options,
            )
            .await
        }
    }
}

/// Append rows from an in-memory table, spooling through a temporary CSV.
pub(crate) async fn append_table(
    pool: &MySqlPool,
    importer: &dyn TableImporter,
    client_options: &ClientOptions,
    default_schema: &str,
    data: &Table,
    table: &str,
    key_cols: &[String],
    mode: AppendMode,
    options: &UploadOptions,
) -> Result<()> {
    if data.is_empty() {
        log::info!("append of empty table into {table} skipped");
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
    append_csv(
        pool,
        importer,
        client_options,
        default_schema,
        tmp.path(),
        table,
        key_cols,
        mode,
        &spool_options,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn append_staging(
    pool: &MySqlPool,
    importer: &dyn TableImporter,
    client_options: &ClientOptions,
    schema_name: &str,
    path: &Path,
    table: &str,
    key_cols: &[String],
    options: &UploadOptions,
) -> Result<()> {
    let staging = format!("{}_staging_{}", table, Uuid::new_v4().simple());

    let staging_options = UploadOptions {
        schema: Some(schema_name.to_string()),
        replace_table: true,
        ..options.clone()
    };

    // Load + merge, then always drop the staging table; the first error
    // still wins.
    let result = async {
        upload_csv(
            pool,
            importer,
            client_options,
            schema_name,
            path,
            &staging,
            &staging_options,
        )
        .await?;
        merge_staging(pool, schema_name, table, &staging, key_cols).await
    }
    .await;

    let drop_sql = format!(
        "DROP TABLE IF EXISTS {}.{}",
        quote_ident(schema_name),
        quote_ident(&staging)
    );
    if let Err(e) = sqlx::query(&drop_sql).execute(pool).await {
        log::warn!("failed to drop staging table {staging}: {e}");
    }

    result
}

/// Duplicate-skipping insert from staging into the destination. Rows whose
/// key-column combination already exists are left untouched; `INSERT
/// IGNORE` additionally absorbs unique-key collisions when the destination
/// declares them.
async fn merge_staging(
    pool: &MySqlPool,
    schema_name: &str,
    table: &str,
    staging: &str,
    key_cols: &[String],
) -> Result<()> {
    let match_clause = key_cols
        .iter()
        .map(|k| format!("d.{k} <=> st.{k}", k = quote_ident(k)))
        .collect::<Vec<_>>()
        .join(" AND ");

    let sql = format!(
        "INSERT IGNORE INTO {schema}.{dest} \
         SELECT st.* FROM {schema}.{stage} st \
         WHERE NOT EXISTS (SELECT 1 FROM {schema}.{dest} d WHERE {match_clause})",
        schema = quote_ident(schema_name),
        dest = quote_ident(table),
        stage = quote_ident(staging),
    );
    let result = sqlx::query(&sql).execute(pool).await?;
    log::info!(
        "merged {} new rows into {}.{}",
        result.rows_affected(),
        schema_name,
        table
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn append_watermark(
    pool: &MySqlPool,
    importer: &dyn TableImporter,
    client_options: &ClientOptions,
    schema_name: &str,
    path: &Path,
    table: &str,
    key_cols: &[String],
    options: &UploadOptions,
) -> Result<()> {
    let order_key = &key_cols[0];

    let watermark: Option<String> = sqlx::query_scalar(&format!(
        "SELECT CAST(MAX({}) AS CHAR) FROM {}.{}",
        quote_ident(order_key),
        quote_ident(schema_name),
        quote_ident(table)
    ))
    .fetch_one(pool)
    .await?;

    match &watermark {
        Some(mark) => log::info!("watermark for {}.{} is {} = {}", schema_name, table, order_key, mark),
        None => log::info!("{}.{} is empty; loading whole file", schema_name, table),
    }

    let header = clean::resolve_header(path, options.header)?;
    let tmp = tempfile::Builder::new()
        .prefix("wm_")
        .suffix(".csv")
        .tempfile()?;
    let kept = filter_above_watermark(
        path,
        tmp.path(),
        header,
        order_key,
        watermark.as_deref(),
    )?;

    if kept == 0 {
        log::info!("no rows above the watermark; destination unchanged");
        return Ok(());
    }

    // The destination's own column names drive the import so headerless
    // remainders still map positionally.
    let dest_columns = destination_columns(pool, schema_name, table).await?;
    let filtered_options = UploadOptions {
        schema: Some(schema_name.to_string()),
        replace_table: false,
        // The remainder was rewritten cell-by-cell; nothing left to clean.
        clean: false,
        header: if header { HeaderMode::Present } else { HeaderMode::Absent },
        columns: Some(dest_columns),
        ..options.clone()
    };
    upload_csv(
        pool,
        importer,
        client_options,
        schema_name,
        tmp.path(),
        table,
        &filtered_options,
    )
    .await
}

/// Copy rows whose key exceeds the watermark into `out`, preserving the
/// header and normalizing cells on the way (trim, null markers to `\N`).
/// Returns the number of data rows kept.
///
/// Keys are compared numerically when both sides parse as numbers and
/// lexicographically otherwise, which orders ISO dates correctly. Rows with
/// a null key never exceed the watermark and are dropped.
pub(crate) fn filter_above_watermark(
    src: &Path,
    out: &Path,
    header: bool,
    order_key: &str,
    watermark: Option<&str>,
) -> Result<u64> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(src)?;
    let mut writer = csv::Writer::from_path(out)?;

    let mut record = csv::StringRecord::new();
    let mut key_index: usize = parse_generated_index(order_key).unwrap_or(0);
    let mut kept = 0u64;
    let mut first = true;

    while reader.read_record(&mut record)? {
        if first {
            first = false;
            if header {
                key_index = record
                    .iter()
                    .position(|c| c.trim() == order_key)
                    .ok_or_else(|| Error::MissingColumn(order_key.to_string()))?;
                writer.write_record(&record)?;
                continue;
            } else if parse_generated_index(order_key).is_none() {
                return Err(Error::MissingColumn(order_key.to_string()));
            }
        }

        let key = record.get(key_index).unwrap_or("").trim();
        if is_null_marker(key) {
            continue;
        }
        if watermark.is_none_or(|mark| exceeds(key, mark)) {
            writer.write_record(record.iter().map(|cell| {
                let cell = cell.trim();
                if is_null_marker(cell) { NULL_TOKEN } else { cell }
            }))?;
            kept += 1;
        }
    }
    writer.flush()?;

    log::debug!("watermark filter kept {kept} rows from {}", src.display());
    Ok(kept)
}

/// `colN` names address headerless files by position.
fn parse_generated_index(name: &str) -> Option<usize> {
    name.strip_prefix("col")?.parse().ok()
}

/// Strictly-greater comparison: numeric when both sides are numbers,
/// lexicographic otherwise.
fn exceeds(key: &str, watermark: &str) -> bool {
    match (key.parse::<f64>(), watermark.parse::<f64>()) {
        (Ok(k), Ok(w)) => k > w,
        _ => key > watermark,
    }
}

/// Destination column names in ordinal order, from the information schema.
async fn destination_columns(
    pool: &MySqlPool,
    schema_name: &str,
    table: &str,
) -> Result<Vec<ColumnSpec>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION",
    )
    .bind(schema_name)
    .bind(table)
    .fetch_all(pool)
    .await?;

    Ok(names
        .into_iter()
        .map(|name| ColumnSpec::new(name, "TEXT"))
        .collect())
}

/// Count data rows, discounting a header when one is present or sniffed.
fn count_data_rows(path: &Path, header: HeaderMode) -> Result<u64> {
    let header = clean::resolve_header(path, header)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut record = csv::StringRecord::new();
    let mut rows = 0u64;
    while reader.read_record(&mut record)? {
        rows += 1;
    }
    Ok(rows.saturating_sub(header as u64))
}
