//! MySQL server backend.
//!
//! Layout of the private directory:
//!
//! ```text
//! my.cnf        server configuration, passed with --defaults-file
//! data/         datadir
//! tmp/          tmpdir
//! mysql.sock    rendezvous socket; networking is disabled
//! mysqld.pid
//! mysqld.err    server error log
//! ```
use crate::config::MysqlConfig;
use crate::error::{Error, Result};
use crate::instance::process::{run_checked, spawn_server};
use crate::instance::server::{InstanceDir, ServerBackend};
use crate::params::ConnectArgs;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Executor};
use std::path::PathBuf;
use tokio::process::{Child, Command};

const CONFIG_FILE: &str = "my.cnf";
const DATA_DIR: &str = "data";
const TMP_DIR: &str = "tmp";
const SOCKET_FILE: &str = "mysql.sock";
const PID_FILE: &str = "mysqld.pid";
const ERROR_LOG: &str = "mysqld.err";

/// Longest path a unix socket can bind to (`sun_path` minus the NUL).
pub const MAX_SOCKET_PATH_LEN: usize = 107;

#[derive(Debug, Clone)]
pub struct MysqlBackend {
    config: MysqlConfig,
}

impl MysqlBackend {
    pub fn new(config: MysqlConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn socket_path(dir: &InstanceDir) -> PathBuf {
        dir.join(SOCKET_FILE)
    }

    /// The server cannot bind a socket whose path does not fit `sun_path`.
    fn check_socket_path(dir: &InstanceDir) -> Result<()> {
        let socket = Self::socket_path(dir);
        let len = socket.as_os_str().len();
        if len > MAX_SOCKET_PATH_LEN {
            return Err(Error::InvalidConfig {
                field: "temp_root".to_string(),
                message: format!(
                    "socket path {} is {} bytes, longer than the {} byte limit; use a shorter temp_root",
                    socket.display(),
                    len,
                    MAX_SOCKET_PATH_LEN
                ),
            });
        }
        Ok(())
    }

    fn defaults_file_arg(dir: &InstanceDir) -> String {
        format!("--defaults-file={}", dir.join(CONFIG_FILE).display())
    }

    fn render_config(dir: &InstanceDir) -> String {
        format!(
            "[mysqld]\n\
             datadir={}\n\
             tmpdir={}\n\
             socket={}\n\
             pid-file={}\n\
             log-error={}\n\
             skip-networking\n",
            dir.join(DATA_DIR).display(),
            dir.join(TMP_DIR).display(),
            dir.join(SOCKET_FILE).display(),
            dir.join(PID_FILE).display(),
            dir.join(ERROR_LOG).display(),
        )
    }

    /// Administrative connection over the socket, no password.
    async fn connect_admin(&self, dir: &InstanceDir) -> Result<MySqlConnection> {
        let options = MySqlConnectOptions::new()
            .socket(Self::socket_path(dir))
            .username(&self.config.root_user);

        MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| Error::ConnectionFailed {
                source: Box::new(e),
                context: format!(
                    "Failed to connect to mysql as '{}' over {}",
                    self.config.root_user,
                    Self::socket_path(dir).display()
                ),
            })
    }

    /// Run statements, in order, as the administrative user.
    async fn admin_execute(&self, dir: &InstanceDir, statements: &[String]) -> Result<()> {
        let mut conn = self.connect_admin(dir).await?;
        for statement in statements {
            tracing::debug!("mysql admin: {}", statement);
            conn.execute(statement.as_str())
                .await
                .map_err(|e| Error::QueryFailed {
                    source: Box::new(e),
                    query: statement.clone(),
                    context: "Failed to run administrative statement".into(),
                })?;
        }
        conn.close().await?;
        Ok(())
    }
}

#[async_trait]
impl ServerBackend for MysqlBackend {
    fn name(&self) -> &str {
        "mysql"
    }

    fn dbtype(&self) -> &str {
        "MySQLdb"
    }

    async fn install(&self, dir: &InstanceDir) -> Result<()> {
        Self::check_socket_path(dir)?;
        dir.create_subdir(DATA_DIR)?;
        dir.create_subdir(TMP_DIR)?;
        dir.write_file(CONFIG_FILE, &Self::render_config(dir))?;

        let mut cmd = Command::new(&self.config.install_bin);
        cmd.arg(Self::defaults_file_arg(dir))
            .args(&self.config.install_args);
        run_checked(&mut cmd).await
    }

    fn start(&self, dir: &InstanceDir) -> Result<Child> {
        let mut cmd = Command::new(&self.config.server_bin);
        cmd.arg(Self::defaults_file_arg(dir));
        spawn_server(&mut cmd)
    }

    async fn ping(&self, dir: &InstanceDir) -> Result<()> {
        let mut conn = self.connect_admin(dir).await?;
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&mut conn)
            .await
            .map_err(|e| Error::QueryFailed {
                source: Box::new(e),
                query: "SELECT 1".to_string(),
                context: "Readiness probe".into(),
            })?;
        conn.close().await?;
        Ok(())
    }

    async fn bootstrap_account(&self, dir: &InstanceDir) -> Result<()> {
        self.admin_execute(
            dir,
            &[format!(
                "CREATE USER '{}'@'localhost' IDENTIFIED BY '{}'",
                self.config.user, self.config.password
            )],
        )
        .await
    }

    async fn create_schema(&self, dir: &InstanceDir) -> Result<()> {
        self.admin_execute(
            dir,
            &[
                format!("CREATE DATABASE `{}`", self.config.database),
                format!(
                    "GRANT ALL ON `{}`.* TO '{}'@'localhost'",
                    self.config.database, self.config.user
                ),
            ],
        )
        .await
    }

    fn connect_args(&self, dir: &InstanceDir) -> ConnectArgs {
        ConnectArgs::map([
            ("db", self.config.database.clone()),
            ("passwd", self.config.password.clone()),
            (
                "unix_socket",
                Self::socket_path(dir).display().to_string(),
            ),
            ("user", self.config.user.clone()),
        ])
    }

    async fn drop_schema(&self, dir: &InstanceDir) -> Result<()> {
        self.admin_execute(dir, &[format!("DROP DATABASE `{}`", self.config.database)])
            .await
    }

    async fn shutdown(&self, dir: &InstanceDir) -> Result<()> {
        let mut cmd = Command::new(&self.config.admin_bin);
        cmd.arg("-S")
            .arg(Self::socket_path(dir))
            .arg("-u")
            .arg(&self.config.root_user)
            .arg("shutdown");
        run_checked(&mut cmd).await
    }
}
