use crate::error::{Error, Result};
use crate::params::ConnectArgs;
use crate::store::Store;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const MEMORY_DSN: &str = "sqlite::memory:";
const FILE_MAX_CONNECTIONS: u32 = 4;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a pool for `":memory:"` or a database file.
    ///
    /// An in-memory database lives exactly as long as its connection, so that pool is
    /// pinned to one connection that never idles out.
    pub async fn connect(dbtype: &str, args: &ConnectArgs) -> Result<Self> {
        let ConnectArgs::Path(path) = args else {
            return Err(Error::InvalidConnectArgs {
                dbtype: dbtype.to_string(),
                message: "expected a database path".to_string(),
            });
        };

        let (options, max_connections) = if args.is_memory() {
            (SqliteConnectOptions::from_str(MEMORY_DSN)?, 1)
        } else {
            (
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true),
                FILE_MAX_CONNECTIONS,
            )
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| Error::ConnectionFailed {
                source: Box::new(e),
                context: format!("Failed to open sqlite database '{}'", path),
            })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite3"
    }

    async fn execute_raw(&self, sql: &str) -> Result<()> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::QueryFailed {
                query: sql.to_string(),
                source: Box::new(e),
                context: "Failed to execute raw SQL".into(),
            })?;
        Ok(())
    }

    async fn query_int(&self, sql: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::QueryFailed {
                query: sql.to_string(),
                source: Box::new(e),
                context: "Failed to query integer".into(),
            })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
