//! The client context object.
//!
//! Everything with process-wide flavor (the connection pool, the cache
//! location, the importer) lives in an explicitly constructed [`DbClient`]
//! handed to operations, which keeps tests able to substitute any piece.

use std::path::Path;
use std::sync::Arc;

use sqlx::MySqlPool;

use crate::cache::QueryCache;
use crate::config::{ClientOptions, DbConfig};
use crate::error::Result;
use crate::importer::{MysqlShellImporter, TableImporter};
use crate::load::{AppendMode, HeaderMode, UploadOptions, append, upload};
use crate::pool;
use crate::query::{self, QueryOptions};
use crate::table::{Table, Value};

/// Handle over the pool, the query cache, and the bulk importer.
pub struct DbClient {
    pool: MySqlPool,
    cache: QueryCache,
    importer: Arc<dyn TableImporter>,
    config: DbConfig,
    options: ClientOptions,
}

impl DbClient {
    /// Connect using environment configuration and defaults.
    pub async fn connect() -> Result<Self> {
        Self::with_options(DbConfig::from_env()?, ClientOptions::default()).await
    }

    /// Connect with explicit configuration, using the MySQL Shell importer.
    pub async fn with_options(config: DbConfig, options: ClientOptions) -> Result<Self> {
        let importer = Arc::new(MysqlShellImporter::new(&config, options.import_retries));
        Self::with_importer(config, options, importer).await
    }

    /// Connect with a caller-supplied importer. Tests use this to swap in a
    /// fake that loads rows through the pool.
    pub async fn with_importer(
        config: DbConfig,
        options: ClientOptions,
        importer: Arc<dyn TableImporter>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&options.cache_dir)?;
        let pool = pool::connect(&config, &options).await?;
        let cache = QueryCache::new(options.cache_dir.clone(), options.cache_ttl);

        Ok(Self {
            pool,
            cache,
            importer,
            config,
            options,
        })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Execute SQL with default options: cache honored, no parameters.
    pub async fn run_sql(&self, sql: &str) -> Result<Table> {
        self.run_sql_with(sql, &[], QueryOptions::default()).await
    }

    /// Execute SQL with positional parameters and per-query options.
    pub async fn run_sql_with(
        &self,
        sql: &str,
        params: &[Value],
        options: QueryOptions,
    ) -> Result<Table> {
        query::run_sql(&self.pool, &self.cache, sql, params, options).await
    }

    /// Bulk-load a CSV file into `table`. See [`UploadOptions`] for the
    /// normalization, header, and replace semantics.
    pub async fn upload_csv(
        &self,
        path: impl AsRef<Path>,
        table: &str,
        options: &UploadOptions,
    ) -> Result<()> {
        warn_on_schema_conflict(table, options);
        upload::upload_csv(
            &self.pool,
            self.importer.as_ref(),
            &self.options,
            &self.config.database,
            path.as_ref(),
            table,
            options,
        )
        .await
    }

    /// Bulk-load an in-memory table via a temporary CSV spool.
    pub async fn upload_table(
        &self,
        data: &Table,
        table: &str,
        options: &UploadOptions,
    ) -> Result<()> {
        warn_on_schema_conflict(table, options);
        upload::upload_table(
            &self.pool,
            self.importer.as_ref(),
            &self.options,
            &self.config.database,
            data,
            table,
            options,
        )
        .await
    }

    /// Incrementally merge a CSV file into `table`; duplicates on
    /// `key_cols` are skipped, never replaced.
    pub async fn append_csv(
        &self,
        path: impl AsRef<Path>,
        table: &str,
        key_cols: &[String],
        mode: AppendMode,
        options: &UploadOptions,
    ) -> Result<()> {
        warn_on_schema_conflict(table, options);
        append::append_csv(
            &self.pool,
            self.importer.as_ref(),
            &self.options,
            &self.config.database,
            path.as_ref(),
            table,
            key_cols,
            mode,
            options,
        )
        .await
    }

    /// Incrementally merge an in-memory table into `table`.
    pub async fn append_table(
        &self,
        data: &Table,
        table: &str,
        key_cols: &[String],
        mode: AppendMode,
        options: &UploadOptions,
    ) -> Result<()> {
        warn_on_schema_conflict(table, options);
        append::append_table(
            &self.pool,
            self.importer.as_ref(),
            &self.options,
            &self.config.database,
            data,
            table,
            key_cols,
            mode,
            options,
        )
        .await
    }
}

/// An explicit column schema is authoritative; a forced header flag given
/// alongside it is honored only for row skipping, never silently dropped.
fn warn_on_schema_conflict(table: &str, options: &UploadOptions) {
    if options.columns.is_some() && options.header != HeaderMode::Auto {
        log::warn!(
            "explicit column schema supplied for {table}; header flag is honored only for row skipping"
        );
    }
}
