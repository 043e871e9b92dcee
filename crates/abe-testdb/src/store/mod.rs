//! Store handles.
//!
//! A store handle is the open connection the application under test works with. The
//! provisioning code only needs to hand it over and, at teardown, release it; the
//! [`Store`] trait also carries enough raw SQL access for tests to check what the
//! handle can and cannot reach.
use crate::error::Result;
use async_trait::async_trait;

pub mod any;
pub mod mysql;
pub mod sqlite;

pub use any::AnyStore;

/// Opaque handle to a provisioned database.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Returns the backend name (e.g., "sqlite3", "mysql")
    fn backend_name(&self) -> &'static str;

    /// Execute a statement that returns no rows.
    async fn execute_raw(&self, sql: &str) -> Result<()>;

    /// Run a query returning a single integer.
    async fn query_int(&self, sql: &str) -> Result<i64>;

    /// Release every connection held by this handle.
    async fn close(&self) -> Result<()>;
}
