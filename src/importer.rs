//! External bulk importer.
//!
//! The heavy lifting of a bulk load is delegated to MySQL Shell's
//! `util import-table`, invoked as a separate process. The tool is hidden
//! behind the narrow [`TableImporter`] trait (input file, target, options
//! in; success or diagnostics out) so tests can substitute a fake that
//! loads rows through the pool instead.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::process::Command;

use crate::config::DbConfig;

/// One bulk-load request: everything the external tool needs to know.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub path: PathBuf,
    pub schema: String,
    pub table: String,
    /// Destination column names, in file order.
    pub columns: Vec<String>,
    /// CSV dialect identifier understood by the tool.
    pub dialect: String,
    pub threads: usize,
    /// Leading rows to skip (1 when the file has a header).
    pub skip_rows: u64,
    /// Replace rows that collide on a unique key instead of failing.
    pub replace_duplicates: bool,
}

/// Diagnostics from a completed import.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    pub stdout: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("import tool '{0}' not found on PATH")]
    BinaryMissing(String),

    #[error("import tool exited with {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("io error running import tool: {0}")]
    Io(#[from] std::io::Error),
}

/// Narrow seam over the external bulk-import tool.
#[async_trait]
pub trait TableImporter: Send + Sync {
    async fn import(&self, request: &ImportRequest) -> Result<ImportOutcome, ImportError>;
}

/// Production importer: shells out to `mysqlsh`.
pub struct MysqlShellImporter {
    uri: String,
    binary: String,
    /// Extra attempts after the first failure; zero means fail fast.
    retries: u32,
}

impl MysqlShellImporter {
    /// Default binary name, overridable through `MYSQLSH_BIN`.
    const DEFAULT_BINARY: &'static str = "mysqlsh";

    pub fn new(config: &DbConfig, retries: u32) -> Self {
        let binary = std::env::var("MYSQLSH_BIN")
            .unwrap_or_else(|_| Self::DEFAULT_BINARY.to_string());
        Self {
            uri: config.shell_uri(),
            binary,
            retries,
        }
    }

    /// Argument vector after the binary name. Kept separate from the spawn
    /// so the shape is testable without a MySQL Shell on the machine.
    fn build_args(&self, request: &ImportRequest) -> Vec<String> {
        let mut args = vec![
            self.uri.clone(),
            "--".to_string(),
            "util".to_string(),
            "import-table".to_string(),
            request.path.display().to_string(),
            format!("--schema={}", request.schema),
            format!("--table={}", request.table),
            format!("--columns={}", request.columns.join(",")),
            format!("--dialect={}", request.dialect),
            format!("--threads={}", request.threads),
            format!("--skipRows={}", request.skip_rows),
            "--showProgress=false".to_string(),
        ];
        if request.replace_duplicates {
            args.push("--replaceDuplicates".to_string());
        }
        args
    }

    async fn run_once(&self, request: &ImportRequest) -> Result<Output, ImportError> {
        Command::new(&self.binary)
            .args(self.build_args(request))
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ImportError::BinaryMissing(self.binary.clone()),
                _ => ImportError::Io(e),
            })
    }
}

#[async_trait]
impl TableImporter for MysqlShellImporter {
    async fn import(&self, request: &ImportRequest) -> Result<ImportOutcome, ImportError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            log::info!(
                "importing {} into {}.{} ({} threads, attempt {})",
                request.path.display(),
                request.schema,
                request.table,
                request.threads,
                attempt
            );

            match self.run_once(request).await {
                Ok(output) if output.status.success() => {
                    return Ok(ImportOutcome {
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    });
                }
                Ok(output) => {
                    let error = ImportError::Failed {
                        status: output.status.code().unwrap_or(-1),
                        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    };
                    if attempt > self.retries {
                        return Err(error);
                    }
                    let wait = backoff(attempt);
                    log::warn!("{error}; retrying in {:.1}s", wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                }
                // A missing binary will not appear on retry.
                Err(e) => return Err(e),
            }
        }
    }
}

/// Exponential backoff with up to one second of jitter.
fn backoff(attempt: u32) -> Duration {
    let base = 2u64.saturating_pow(attempt.min(6));
    let jitter = rand::thread_rng().gen_range(0..1000);
    Duration::from_millis(base * 1000 + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DbConfig {
        DbConfig {
            user: "u".into(),
            password: "p".into(),
            host: "h".into(),
            port: 3306,
            database: "d".into(),
        }
    }

    fn request() -> ImportRequest {
        ImportRequest {
            path: PathBuf::from("/tmp/data.csv"),
            schema: "warehouse".into(),
            table: "trades".into(),
            columns: vec!["id".into(), "price".into()],
            dialect: "csv-unix".into(),
            threads: 4,
            skip_rows: 1,
            replace_duplicates: false,
        }
    }

    #[test]
    fn args_cover_every_option() {
        let importer = MysqlShellImporter::new(&config(), 0);
        let args = importer.build_args(&request());

        assert_eq!(args[0], "mysql://u:p@h:3306");
        assert_eq!(args[1], "--");
        assert!(args.contains(&"import-table".to_string()));
        assert!(args.contains(&"--schema=warehouse".to_string()));
        assert!(args.contains(&"--table=trades".to_string()));
        assert!(args.contains(&"--columns=id,price".to_string()));
        assert!(args.contains(&"--threads=4".to_string()));
        assert!(args.contains(&"--skipRows=1".to_string()));
        assert!(!args.iter().any(|a| a == "--replaceDuplicates"));
    }

    #[test]
    fn replace_duplicates_appends_flag() {
        let importer = MysqlShellImporter::new(&config(), 0);
        let mut req = request();
        req.replace_duplicates = true;
        let args = importer.build_args(&req);
        assert_eq!(args.last().unwrap(), "--replaceDuplicates");
    }

    #[test]
    fn backoff_grows_with_attempts() {
        assert!(backoff(1) >= Duration::from_secs(2));
        assert!(backoff(3) >= Duration::from_secs(8));
        assert!(backoff(3) < Duration::from_secs(10));
    }
}
