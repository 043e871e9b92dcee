//! # abe-testdb
//!
//! **abe-testdb** provisions throwaway databases for integration tests: an in-memory SQLite
//! database, or a private MySQL server started in a temporary directory, bootstrapped with
//! its own account and schema, and removed without a trace afterwards.
//!
//! ## Features
//!
//! ### Backends
//! - **Embedded**: in-memory SQLite by default, or a file-backed database at a chosen path.
//! - **Server**: a private `mysqld` listening only on a socket inside its own directory,
//!   with a dedicated low-privilege account that owns exactly one schema.
//! - **Skips, not failures**: unknown or unavailable backends are reported as skipped.
//!
//! ### Lifecycle
//! - **Readiness polling**: waits for the server to answer instead of sleeping blindly.
//! - **Guaranteed cleanup**: a failed setup releases whatever it acquired; teardown runs
//!   every step and reports every failure.
//! - **One teardown**: deleting an instance consumes it.
//!
//! ## Quick Start
//!
//! ```rust
//! # async fn example() -> abe_testdb::Result<()> {
//! let Some(db) = abe_testdb::create(Some("sqlite3")).await?.ready() else {
//!     return Ok(());
//! };
//!
//! db.store().execute_raw("CREATE TABLE block (height INTEGER)").await?;
//! assert_eq!(db.store().query_int("SELECT COUNT(*) FROM block").await?, 0);
//!
//! db.delete().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Per-module fixture
//!
//! ```rust,no_run
//! use abe_testdb::{Config, Fixture};
//!
//! # async fn example() -> abe_testdb::Result<()> {
//! let mut fixture = Fixture::new(Config::load()?);
//! for backend in fixture.params() {
//!     if let Some(db) = fixture.get(&backend).await? {
//!         println!("{} -> {:?}", backend, db.cmdline()?);
//!     }
//! }
//! fixture.finalize().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod fixture;
pub mod instance;
pub mod params;
pub mod store;

pub use crate::backend::{BackendType, Selection};
pub use crate::bootstrap::{open_store, Bootstrap, BootstrapArgs, SqlxBootstrap};
pub use crate::config::{BackendSelection, Config, MysqlConfig};
pub use crate::error::{Error, Result, TeardownFailures};
pub use crate::fixture::Fixture;
pub use crate::instance::{
    create, create_with, resolve, EmbeddedDb, Provisioned, ServerBackend, ServerDb, ServerState,
    Skip, TestDb,
};
pub use crate::params::{ConnectArgs, ParamValue};
pub use crate::store::{AnyStore, Store};
