//! Shared fixtures for integration tests: a disposable MySQL container and
//! a fake importer that loads CSV rows through the pool, standing in for
//! the external MySQL Shell.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use tempfile::TempDir;
use testcontainers_modules::mysql::Mysql;
use testcontainers_modules::testcontainers::{ContainerAsync, runners::AsyncRunner};

use tabkit::{
    ClientOptions, DbClient, DbConfig, ImportError, ImportOutcome, ImportRequest, TableImporter,
};

pub const TEST_DATABASE: &str = "tabkit_test";

/// A throwaway MySQL server plus a client wired to a fake importer.
///
/// The container and the cache directory live as long as this struct.
pub struct TestDb {
    pub client: DbClient,
    _container: ContainerAsync<Mysql>,
    _cache_dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let container = Mysql::default()
            .start()
            .await
            .expect("mysql container starts");
        let host = container.get_host().await.expect("container host").to_string();
        let port = container
            .get_host_port_ipv4(3306)
            .await
            .expect("mapped mysql port");

        let config = DbConfig {
            user: "root".to_string(),
            password: String::new(),
            host,
            port,
            database: TEST_DATABASE.to_string(),
        };

        // The target database has to exist before the pooled client, which
        // always selects it, can connect.
        let admin = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(
                MySqlConnectOptions::new()
                    .host(&config.host)
                    .port(config.port)
                    .username(&config.user),
            )
            .await
            .expect("admin connection");
        sqlx::query(&format!("CREATE DATABASE IF NOT EXISTS `{TEST_DATABASE}`"))
            .execute(&admin)
            .await
            .expect("create test database");
        admin.close().await;

        let cache_dir = tempfile::tempdir().expect("cache dir");
        let options = ClientOptions {
            cache_dir: cache_dir.path().to_path_buf(),
            cache_ttl: Duration::from_secs(3600),
            ..ClientOptions::default()
        };

        let client = DbClient::with_importer(
            config.clone(),
            options,
            Arc::new(FakeImporter::connect(&config).await),
        )
        .await
        .expect("client connects");

        Self {
            client,
            _container: container,
            _cache_dir: cache_dir,
        }
    }

    pub fn pool(&self) -> &MySqlPool {
        self.client.pool()
    }
}

/// Importer double: reads the request's CSV and inserts the rows through a
/// plain connection, honoring `skip_rows` and `replace_duplicates`.
pub struct FakeImporter {
    pool: MySqlPool,
}

impl FakeImporter {
    pub async fn connect(config: &DbConfig) -> Self {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect_with(
                MySqlConnectOptions::new()
                    .host(&config.host)
                    .port(config.port)
                    .username(&config.user)
                    .password(&config.password),
            )
            .await
            .expect("fake importer connects");
        Self { pool }
    }

    fn failed(detail: impl ToString) -> ImportError {
        ImportError::Failed {
            status: 1,
            stderr: detail.to_string(),
        }
    }
}

#[async_trait]
impl TableImporter for FakeImporter {
    async fn import(&self, request: &ImportRequest) -> Result<ImportOutcome, ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&request.path)
            .map_err(Self::failed)?;

        let columns = request
            .columns
            .iter()
            .map(|c| format!("`{c}`"))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; request.columns.len()].join(", ");
        let verb = if request.replace_duplicates {
            "REPLACE"
        } else {
            "INSERT"
        };
        let sql = format!(
            "{verb} INTO `{}`.`{}` ({columns}) VALUES ({placeholders})",
            request.schema, request.table
        );

        let mut record = csv::StringRecord::new();
        let mut index = 0u64;
        let mut inserted = 0u64;
        while reader.read_record(&mut record).map_err(Self::failed)? {
            index += 1;
            if index <= request.skip_rows {
                continue;
            }
            let mut query = sqlx::query(&sql);
            for cell in record.iter() {
                query = if cell == r"\N" {
                    query.bind(Option::<String>::None)
                } else {
                    query.bind(cell.to_string())
                };
            }
            query.execute(&self.pool).await.map_err(Self::failed)?;
            inserted += 1;
        }

        Ok(ImportOutcome {
            stdout: format!("{inserted} rows imported"),
        })
    }
}
