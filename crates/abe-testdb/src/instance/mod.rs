//! Test database instances.
//!
//! [`create_with`] resolves a backend identifier and provisions the matching kind of
//! instance: an in-memory SQLite database for the embedded backend, a private server for
//! server backends. Identifiers that are unknown, or known but not provisionable here,
//! yield [`Provisioned::Skipped`] instead of an error.
pub mod embedded;
pub mod mysql;
pub mod process;
pub mod server;

pub use embedded::EmbeddedDb;
pub use mysql::MysqlBackend;
pub use server::{InstanceDir, ServerBackend, ServerDb, ServerState};

use crate::backend::{BackendType, Selection};
use crate::bootstrap::{Bootstrap, BootstrapArgs, SqlxBootstrap};
use crate::config::Config;
use crate::error::Result;
use crate::params::ConnectArgs;
use crate::store::Store;
use std::fmt;
use std::path::Path;

/// A provisioned test database of either kind.
#[derive(Debug)]
pub enum TestDb {
    Embedded(EmbeddedDb),
    Server(ServerDb),
}

impl TestDb {
    /// Short backend name for logs.
    pub fn name(&self) -> &str {
        match self {
            Self::Embedded(_) => BackendType::Sqlite.name(),
            Self::Server(db) => db.name(),
        }
    }

    pub fn dbtype(&self) -> &str {
        match self {
            Self::Embedded(db) => db.dbtype(),
            Self::Server(db) => db.dbtype(),
        }
    }

    pub fn connect_args(&self) -> &ConnectArgs {
        match self {
            Self::Embedded(db) => db.connect_args(),
            Self::Server(db) => db.connect_args(),
        }
    }

    /// The store opened for this instance at creation.
    pub fn store(&self) -> &dyn Store {
        match self {
            Self::Embedded(db) => db.store(),
            Self::Server(db) => db.store(),
        }
    }

    /// The bootstrap command line that opens this instance.
    pub fn cmdline(&self) -> Result<Vec<String>> {
        Ok(BootstrapArgs::new(self.dbtype(), self.connect_args())?.to_cmdline())
    }

    /// Private directory of a server instance.
    pub fn working_dir(&self) -> Option<&Path> {
        match self {
            Self::Embedded(_) => None,
            Self::Server(db) => db.working_dir(),
        }
    }

    /// Tear the instance down.
    pub async fn delete(self) -> Result<()> {
        match self {
            Self::Embedded(db) => db.delete().await,
            Self::Server(db) => db.delete().await,
        }
    }
}

/// A backend that was requested but will not be provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    pub requested: String,
    pub reason: String,
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipping {}: {}", self.requested, self.reason)
    }
}

/// Outcome of [`create_with`].
#[derive(Debug)]
pub enum Provisioned {
    Ready(TestDb),
    Skipped(Skip),
}

impl Provisioned {
    pub fn ready(self) -> Option<TestDb> {
        match self {
            Self::Ready(db) => Some(db),
            Self::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// Resolve `requested` to a backend that can be provisioned, or say why not.
pub fn resolve(requested: Option<&str>) -> std::result::Result<BackendType, Skip> {
    match BackendType::select(requested) {
        Selection::Unsupported { requested } => Err(Skip {
            reason: format!("Unknown dbtype: {}", requested),
            requested,
        }),
        Selection::Supported(backend) => match backend.unavailable_reason() {
            Some(reason) => Err(Skip {
                requested: requested.unwrap_or(backend.name()).to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(backend),
        },
    }
}

/// Provision the requested backend with default configuration and entry point.
pub async fn create(requested: Option<&str>) -> Result<Provisioned> {
    create_with(requested, &Config::default(), &SqlxBootstrap).await
}

/// Provision the requested backend.
pub async fn create_with(
    requested: Option<&str>,
    config: &Config,
    bootstrap: &dyn Bootstrap,
) -> Result<Provisioned> {
    let backend = match resolve(requested) {
        Ok(backend) => backend,
        Err(skip) => {
            tracing::info!("{}", skip);
            return Ok(Provisioned::Skipped(skip));
        }
    };

    tracing::info!("Creating {} test database", backend);
    let db = match backend {
        BackendType::Sqlite => TestDb::Embedded(EmbeddedDb::transient(bootstrap).await?),
        BackendType::Mysql => {
            let server = MysqlBackend::new(config.mysql.clone())?;
            TestDb::Server(ServerDb::create(Box::new(server), config, bootstrap).await?)
        }
        BackendType::Postgres => {
            return Ok(Provisioned::Skipped(Skip {
                requested: backend.name().to_string(),
                reason: "no server backend".to_string(),
            }))
        }
    };
    Ok(Provisioned::Ready(db))
}
