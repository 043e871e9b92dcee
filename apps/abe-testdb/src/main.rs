//! Command-line interface for abe-testdb: provision and check throwaway test databases.
//!
//! ## What
//!
//! - `backends` lists the configured backends and whether each would run or be skipped.
//! - `up` provisions one instance, prints how to connect to it and keeps it alive until
//!   Ctrl-C.
//! - `check` provisions and immediately tears down each backend, as a smoke test of the
//!   local toolchain.
//!
//! ## How
//!
//! ```sh
//! ABE_TEST=quick abe-testdb backends
//! abe-testdb --config testdb.yaml up mysql
//! abe-testdb check sqlite3 mysql
//! ```
use clap::{Parser, Subcommand};
use std::process;

mod commands;

#[derive(Parser)]
#[command(name = "abe-testdb")]
#[command(about = "Provision throwaway databases for integration tests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (overrides ABE_TEST_CONFIG_FILE)
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// Log destination: stderr or file path
    #[arg(long, default_value = "stderr")]
    log_dest: String,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the configured backends and how each resolves
    Backends,
    /// Provision one instance and keep it until interrupted
    Up {
        /// Backend identifier (default: sqlite3)
        backend: Option<String>,
    },
    /// Provision and tear down each backend
    Check {
        /// Backend identifiers (default: the configured set)
        backends: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level, &cli.log_dest) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = run_cli(cli).await {
        tracing::error!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing(log_level: &str, log_dest: &str) -> anyhow::Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        other => {
            eprintln!("Unknown log level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let builder = tracing_subscriber::FmtSubscriber::builder().with_max_level(level);
    if log_dest == "stderr" {
        let subscriber = builder.with_writer(std::io::stderr).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let file = std::fs::File::create(log_dest)?;
        let subscriber = builder.with_writer(std::sync::Mutex::new(file)).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    // Priority: --config, ABE_TEST_CONFIG_FILE, then ABE_TEST_DB / ABE_TEST
    let config = abe_testdb::Config::load_with_options(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    let mut out = std::io::stdout().lock();
    match cli.command {
        Commands::Backends => commands::backends(&config, &mut out)?,
        Commands::Up { backend } => commands::up(&config, backend.as_deref(), &mut out).await?,
        Commands::Check { backends } => commands::check(&config, backends, &mut out).await?,
    }
    Ok(())
}
