//! Cached query execution.
//!
//! `run_sql` checks the on-disk cache first, else executes through a pooled
//! connection, converts the `\N` sentinel to [`Value::Null`], stores the
//! result, and returns it. Database errors propagate unmodified; any cache
//! trouble is downgraded to a miss.

use futures_util::TryStreamExt;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, MySqlPool, Row, TypeInfo, ValueRef};

use crate::cache::{CacheError, QueryCache};
use crate::error::Result;
use crate::table::{NULL_TOKEN, Table, Value};

/// Per-query knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Bypass cache reads (the fresh result is still written back).
    pub refresh: bool,
    /// Log fetch progress every this many rows; `None` disables it.
    pub chunk_size: Option<usize>,
}

pub(crate) async fn run_sql(
    pool: &MySqlPool,
    cache: &QueryCache,
    sql: &str,
    params: &[Value],
    options: QueryOptions,
) -> Result<Table> {
    let key = QueryCache::key(sql, params);

    if !options.refresh {
        match cache.load(&key) {
            Ok(table) => return Ok(table),
            Err(CacheError::NotFound) => {}
            Err(e) => log::warn!("cache read failed, re-running query: {e}"),
        }
    }

    let table = fetch_table(pool, sql, params, options.chunk_size).await?;

    if let Err(e) = cache.store(&key, &table) {
        log::warn!("cache write failed: {e}");
    }
    Ok(table)
}

/// Execute and materialize the full result set.
async fn fetch_table(
    pool: &MySqlPool,
    sql: &str,
    params: &[Value],
    chunk_size: Option<usize>,
) -> Result<Table> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            Value::Null => query.bind(Option::<String>::None),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
        };
    }

    let mut table = Table::default();
    let mut stream = query.fetch(pool);
    while let Some(row) = stream.try_next().await? {
        if table.columns.is_empty() {
            table.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
        }
        table.rows.push(decode_row(&row)?);
        if let Some(chunk) = chunk_size {
            if chunk > 0 && table.rows.len() % chunk == 0 {
                log::debug!("fetched {} rows", table.rows.len());
            }
        }
    }

    log::info!("query returned {} rows", table.len());
    Ok(table)
}

fn decode_row(row: &MySqlRow) -> Result<Vec<Value>> {
    let mut cells = Vec::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        cells.push(decode_cell(row, i, column.type_info().name())?);
    }
    Ok(cells)
}

/// Decode one cell by the column's declared type, falling back to text.
/// A text cell equal to the `\N` sentinel decodes to null.
fn decode_cell(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value> {
    // NULLs are uniform across types; check the raw value before decoding.
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match type_name {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" | "BOOLEAN" => {
            Value::Int(row.try_get::<i64, _>(index)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => {
            let v = row.try_get::<u64, _>(index)?;
            i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(v.to_string()))
        }
        "FLOAT" => Value::Float(row.try_get::<f32, _>(index)? as f64),
        "DOUBLE" => Value::Float(row.try_get::<f64, _>(index)?),
        "DATE" => Value::Text(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
        "DATETIME" => Value::Text(
            row.try_get::<chrono::NaiveDateTime, _>(index)?
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        ),
        "TIMESTAMP" => Value::Text(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)?
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        ),
        _ => {
            let text = row.try_get::<String, _>(index)?;
            if text == NULL_TOKEN {
                Value::Null
            } else {
                Value::Text(text)
            }
        }
    };
    Ok(value)
}
