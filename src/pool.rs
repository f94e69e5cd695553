//! Connection pool construction.

use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};

use crate::config::{ClientOptions, DbConfig};
use crate::error::Result;

/// Build a bounded pool from the loaded configuration. Connections are
/// checked out per operation and returned when the operation's scope ends.
pub async fn connect(config: &DbConfig, options: &ClientOptions) -> Result<MySqlPool> {
    let connect_options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database);

    let pool = MySqlPoolOptions::new()
        .max_connections(options.pool_size)
        .acquire_timeout(options.acquire_timeout)
        .connect_with(connect_options)
        .await?;

    log::info!(
        "connected to {}:{}/{} (pool size {})",
        config.host,
        config.port,
        config.database,
        options.pool_size
    );
    Ok(pool)
}
