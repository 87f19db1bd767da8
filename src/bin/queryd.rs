//! queryd CLI — the queue drain daemon and its one-shot helpers.

use clap::{Args, Parser, Subcommand};
use queryd::config::{Config, ConnectionOverrides};
use queryd::daemon::{enter_work_dir, run_exclusive};
use queryd::db::{Db, MySqlQueue};
use queryd::engine::{DrainConfig, QueueDrain};
use queryd::error::{Error, display_code, display_state};
use queryd::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "queryd", about = "Executes SQL statements queued in a MySQL table")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true, env = "QUERYD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Positional connection settings. Each falls back to the config file, then
/// to the built-in default.
#[derive(Args)]
struct ConnectArgs {
    /// Store user
    user: Option<String>,
    /// Store password
    password: Option<String>,
    /// Schema (database) name
    schema: Option<String>,
    /// Host address, optionally host:port
    host: Option<String>,
}

impl From<ConnectArgs> for ConnectionOverrides {
    fn from(args: ConnectArgs) -> Self {
        Self {
            user: args.user,
            password: args.password,
            schema: args.schema,
            host: args.host,
        }
    }
}

/// Positional connection settings for `tables`, host first.
#[derive(Args)]
struct TablesArgs {
    /// Host address, optionally host:port
    host: Option<String>,
    /// Store user
    user: Option<String>,
    /// Store password
    password: Option<String>,
    /// Schema (database) name
    schema: Option<String>,
}

impl From<TablesArgs> for ConnectionOverrides {
    fn from(args: TablesArgs) -> Self {
        Self {
            user: args.user,
            password: args.password,
            schema: args.schema,
            host: args.host,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the queue drain daemon
    Run {
        #[command(flatten)]
        connect: ConnectArgs,
        /// Mirror log lines to stderr
        #[arg(long)]
        stderr: bool,
    },
    /// List the tables of the schema
    Tables {
        #[command(flatten)]
        connect: TablesArgs,
    },
    /// Queue a statement for the daemon
    Submit {
        /// SQL statement, without terminator
        query: String,
        #[command(flatten)]
        connect: ConnectArgs,
    },
    /// Show queued statements without running them
    Pending {
        #[command(flatten)]
        connect: ConnectArgs,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run { connect, stderr } => {
            config.connection.apply(&connect.into())?;
            cmd_run(config, stderr).await
        }
        Command::Tables { connect } => {
            config.connection.apply(&connect.into())?;
            let _guard = init_cli_telemetry(&config)?;
            cmd_tables(&config).await
        }
        Command::Submit { query, connect } => {
            config.connection.apply(&connect.into())?;
            let _guard = init_cli_telemetry(&config)?;
            cmd_submit(&config, &query).await
        }
        Command::Pending { connect } => {
            config.connection.apply(&connect.into())?;
            let _guard = init_cli_telemetry(&config)?;
            cmd_pending(&config).await
        }
    }
}

fn init_cli_telemetry(config: &Config) -> anyhow::Result<TelemetryGuard> {
    Ok(init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "queryd".to_string(),
        log_file: None,
        stderr: true,
        log_level: "warn".to_string(),
    })?)
}

async fn cmd_run(config: Config, stderr: bool) -> anyhow::Result<()> {
    enter_work_dir(&config.daemon.work_dir)?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "queryd".to_string(),
        log_file: Some(config.daemon.log_file.clone()),
        stderr,
        log_level: config.log_level.clone(),
    })?;

    let queue = MySqlQueue::new(
        Db::new(&config.connection),
        config.daemon.queue_table.clone(),
    );
    let drain = QueueDrain::new(
        queue,
        DrainConfig {
            poll_interval: config.daemon.poll_interval,
            log_size_warn_bytes: config.daemon.log_size_warn_bytes,
        },
    )
    .with_log_file(&config.daemon.log_file);

    let work = async {
        info!(
            pid = std::process::id(),
            host = %config.connection.host,
            schema = %config.connection.schema,
            table = %config.daemon.queue_table,
            "daemon started"
        );
        drain.run().await
    };

    // Another instance holding the lock is a clean exit too.
    run_exclusive(&config.daemon.lock_file, work).await?;
    Ok(())
}

async fn cmd_tables(config: &Config) -> anyhow::Result<()> {
    let db = Db::new(&config.connection);
    match db.list_tables().await {
        Ok(tables) => {
            for table in tables {
                println!("Table: {table}");
            }
            println!("Done.");
            Ok(())
        }
        Err(Error::Store(e)) => {
            println!(
                "# ERR: {} (MySQL error code: {}, SQLState: {} )",
                e.message,
                display_code(&e.code),
                display_state(&e.sql_state)
            );
            Err(Error::Store(e).into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_submit(config: &Config, query: &str) -> anyhow::Result<()> {
    let queue = MySqlQueue::new(
        Db::new(&config.connection),
        config.daemon.queue_table.clone(),
    );
    let id = queue.submit(query).await?;
    println!("Queued: {id}");
    Ok(())
}

async fn cmd_pending(config: &Config) -> anyhow::Result<()> {
    let queue = MySqlQueue::new(
        Db::new(&config.connection),
        config.daemon.queue_table.clone(),
    );
    let items = queue.pending().await?;

    if items.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    println!("{:<10}  QUERY", "ID");
    println!("{}", "-".repeat(80));
    for item in &items {
        println!("{:<10}  {}", item.id, item.query);
    }
    println!("\n{} item(s)", items.len());
    Ok(())
}
