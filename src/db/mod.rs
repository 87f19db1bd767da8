//! MySQL connection setup and schema listing.
//!
//! No pool: the drain loop opens a fresh connection per cycle and closes it
//! before sleeping, and the one-shot subcommands open exactly one.

pub mod queue;

pub use queue::{MySqlQueue, MySqlQueueSession};

use crate::config::ConnectionConfig;
use crate::error::Result;
use secrecy::ExposeSecret;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::debug;

/// Database handle. Holds connect options; connections are opened on demand.
#[derive(Clone)]
pub struct Db {
    options: MySqlConnectOptions,
}

impl Db {
    pub fn new(config: &ConnectionConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(config.password.expose_secret())
            .database(&config.schema)
            .disable_statement_logging();
        Self { options }
    }

    /// Open a connection with the configured schema selected.
    pub async fn connect(&self) -> Result<MySqlConnection> {
        let conn = self.options.connect().await?;
        debug!("connected to store");
        Ok(conn)
    }

    /// Names of all tables in the selected schema.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.connect().await?;
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT CAST(table_name AS CHAR) FROM information_schema.tables
             WHERE table_schema = DATABASE()
             ORDER BY table_name",
        )
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}
