//! Bootstrap bridge.
//!
//! ## What
//!
//! The application under test is opened through a bootstrap entry point that takes a
//! command line of the form `--dbtype <driver> --connect-args <json>` and returns a ready
//! [`Store`]. This module owns that contract:
//!
//! - [`BootstrapArgs`] builds and parses the command line.
//! - [`Bootstrap`] is the entry point seam; [`SqlxBootstrap`] is the default entry point.
//! - [`open_store`] serializes connection parameters, calls the entry point and returns
//!   its store, passing any failure through as [`Error::Bootstrap`] with the original
//!   error as source. Recovery is the caller's business.
//!
//! ## How
//!
//! ```no_run
//! use abe_testdb::bootstrap::{open_store, SqlxBootstrap};
//! use abe_testdb::params::ConnectArgs;
//!
//! # async fn example() -> abe_testdb::Result<()> {
//! let store = open_store(&SqlxBootstrap, "sqlite3", &ConnectArgs::memory()).await?;
//! store.close().await?;
//! # Ok(())
//! # }
//! ```
use crate::error::{BoxError, Error, Result};
use crate::params::ConnectArgs;
use crate::store::{AnyStore, Store};
use async_trait::async_trait;
use clap::Parser;

const PROGRAM_NAME: &str = "abe";

/// The bootstrap command line.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = PROGRAM_NAME)]
pub struct BootstrapArgs {
    /// Driver identifier, e.g. sqlite3 or MySQLdb
    #[arg(long)]
    pub dbtype: String,

    /// JSON-encoded connection parameters
    #[arg(long = "connect-args")]
    pub connect_args: String,
}

impl BootstrapArgs {
    pub fn new(dbtype: &str, connect_args: &ConnectArgs) -> Result<Self> {
        Ok(Self {
            dbtype: dbtype.to_string(),
            connect_args: connect_args.to_json()?,
        })
    }

    /// Arguments as they appear after the program name.
    pub fn to_cmdline(&self) -> Vec<String> {
        vec![
            "--dbtype".to_string(),
            self.dbtype.clone(),
            "--connect-args".to_string(),
            self.connect_args.clone(),
        ]
    }

    /// Parse arguments that follow the program name.
    pub fn from_cmdline<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = std::iter::once(PROGRAM_NAME.to_string()).chain(argv.into_iter().map(Into::into));
        Ok(Self::try_parse_from(args)?)
    }

    /// Decode the connection parameters blob.
    pub fn decode_connect_args(&self) -> Result<ConnectArgs> {
        ConnectArgs::from_json(&self.connect_args)
    }
}

/// Entry point that turns a bootstrap command line into an open store.
#[async_trait]
pub trait Bootstrap: Send + Sync {
    async fn init(&self, argv: &[String]) -> std::result::Result<Box<dyn Store>, BoxError>;
}

/// Default entry point: an sqlx pool for the requested driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxBootstrap;

#[async_trait]
impl Bootstrap for SqlxBootstrap {
    async fn init(&self, argv: &[String]) -> std::result::Result<Box<dyn Store>, BoxError> {
        let args = BootstrapArgs::from_cmdline(argv.iter().cloned())?;
        let connect_args = args.decode_connect_args()?;
        let store = AnyStore::connect(&args.dbtype, &connect_args).await?;
        Ok(Box::new(store))
    }
}

/// Open a store for `dbtype` through `bootstrap`.
pub async fn open_store(
    bootstrap: &dyn Bootstrap,
    dbtype: &str,
    connect_args: &ConnectArgs,
) -> Result<Box<dyn Store>> {
    let argv = BootstrapArgs::new(dbtype, connect_args)?.to_cmdline();
    tracing::debug!("Bootstrapping store with --dbtype {}", dbtype);
    bootstrap.init(&argv).await.map_err(Error::Bootstrap)
}
