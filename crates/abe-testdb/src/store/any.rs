//! AnyStore enum for runtime backend selection.
//!
//! `AnyStore` wraps the sqlx-backed store implementations and dispatches on the
//! `--dbtype` driver identifier, so the default bootstrap entry point can hand out a
//! single concrete type.

use super::mysql::MySqlStore;
use super::sqlite::SqliteStore;
use super::Store;
use crate::backend::BackendType;
use crate::error::{Error, Result};
use crate::params::ConnectArgs;
use async_trait::async_trait;

/// Runtime-selectable store.
#[derive(Clone, Debug)]
pub enum AnyStore {
    Sqlite(SqliteStore),
    MySql(MySqlStore),
}

impl AnyStore {
    /// Open a store for a driver identifier such as `sqlite3` or `MySQLdb`.
    pub async fn connect(dbtype: &str, args: &ConnectArgs) -> Result<Self> {
        match BackendType::from_dbtype(dbtype) {
            Some(BackendType::Sqlite) => Ok(Self::Sqlite(SqliteStore::connect(dbtype, args).await?)),
            Some(BackendType::Mysql) => Ok(Self::MySql(MySqlStore::connect(dbtype, args).await?)),
            Some(BackendType::Postgres) | None => Err(Error::InvalidConfig {
                field: "dbtype".to_string(),
                message: format!("Unsupported dbtype: {}", dbtype),
            }),
        }
    }
}

#[async_trait]
impl Store for AnyStore {
    fn backend_name(&self) -> &'static str {
        match self {
            AnyStore::Sqlite(s) => s.backend_name(),
            AnyStore::MySql(s) => s.backend_name(),
        }
    }

    async fn execute_raw(&self, sql: &str) -> Result<()> {
        match self {
            AnyStore::Sqlite(s) => s.execute_raw(sql).await,
            AnyStore::MySql(s) => s.execute_raw(sql).await,
        }
    }

    async fn query_int(&self, sql: &str) -> Result<i64> {
        match self {
            AnyStore::Sqlite(s) => s.query_int(sql).await,
            AnyStore::MySql(s) => s.query_int(sql).await,
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            AnyStore::Sqlite(s) => s.close().await,
            AnyStore::MySql(s) => s.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_keeps_state_across_queries() {
        let store = AnyStore::connect("sqlite3", &ConnectArgs::memory())
            .await
            .expect("Failed to open in-memory sqlite");
        assert_eq!(store.backend_name(), "sqlite3");

        store
            .execute_raw("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();
        store.execute_raw("INSERT INTO t (id) VALUES (7)").await.unwrap();
        assert_eq!(store.query_int("SELECT COUNT(*) FROM t").await.unwrap(), 1);

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_dbtype() {
        let result = AnyStore::connect("psycopg2", &ConnectArgs::memory()).await;
        match result {
            Err(Error::InvalidConfig { field, message }) => {
                assert_eq!(field, "dbtype");
                assert!(message.contains("psycopg2"));
            }
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sqlite_rejects_mapping() {
        let args = ConnectArgs::map([("user", "abe")]);
        let result = AnyStore::connect("sqlite3", &args).await;
        assert!(matches!(result, Err(Error::InvalidConnectArgs { .. })));
    }

    #[tokio::test]
    async fn test_mysql_requires_rendezvous() {
        let args = ConnectArgs::map([("user", "abe"), ("db", "abe")]);
        match AnyStore::connect("MySQLdb", &args).await {
            Err(Error::InvalidConnectArgs { message, .. }) => {
                assert!(message.contains("unix_socket"));
            }
            other => panic!("Expected InvalidConnectArgs, got {:?}", other),
        }
    }
}
