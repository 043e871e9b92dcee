use crate::error::{Error, Result};
use crate::params::ConnectArgs;
use crate::store::Store;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Executor;

const MAX_CONNECTIONS: u32 = 4;

#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Connect with `user`, `passwd`, `db` and either `unix_socket` or `host`/`port`.
    pub async fn connect(dbtype: &str, args: &ConnectArgs) -> Result<Self> {
        let user = args.require_str(dbtype, "user")?;
        let database = args.require_str(dbtype, "db")?;

        let mut options = MySqlConnectOptions::new()
            .username(user)
            .database(database);

        if let Some(password) = args.get_str("passwd") {
            options = options.password(password);
        }

        options = match (args.get_str("unix_socket"), args.get_str("host")) {
            (Some(socket), _) => options.socket(socket),
            (None, Some(host)) => {
                let options = options.host(host);
                match args.get_str("port") {
                    Some(port) => options.port(port.parse().map_err(|_| {
                        Error::InvalidConnectArgs {
                            dbtype: dbtype.to_string(),
                            message: format!("invalid port '{}'", port),
                        }
                    })?),
                    None => options,
                }
            }
            (None, None) => {
                return Err(Error::InvalidConnectArgs {
                    dbtype: dbtype.to_string(),
                    message: "need either 'unix_socket' or 'host'".to_string(),
                })
            }
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| Error::ConnectionFailed {
                source: Box::new(e),
                context: format!("Failed to connect to mysql database '{}' as '{}'", database, user),
            })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for MySqlStore {
    fn backend_name(&self) -> &'static str {
        "mysql"
    }

    async fn execute_raw(&self, sql: &str) -> Result<()> {
        // Plain &str goes over the text protocol; DDL and GRANT are not all preparable
        self.pool
            .execute(sql)
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
