//! Configuration types for abe-testdb.
//!
//! ## What
//!
//! - [`Config`] decides which backends a test run exercises, where private working
//!   directories are allocated, how long to wait for a server, and how the MySQL
//!   toolchain is invoked.
//! - [`BackendSelection`] is the abstract backend-set contract: an explicit list, the
//!   single fast default, or the full default set.
//!
//! ## How
//!
//! Build a [`Config`] directly, or load one from the environment or a YAML file. The
//! fixture adapter takes the resulting value at construction; nothing else in the crate
//! reads the environment.
//!
//! ```no_run
//! use abe_testdb::config::{BackendSelection, Config};
//!
//! // Only the embedded backend
//! let config = Config::default().with_backends(BackendSelection::Quick);
//! assert_eq!(config.backend_names(), vec!["sqlite3".to_string()]);
//!
//! // ABE_TEST_DB / ABE_TEST
//! let config = Config::from_env().expect("valid environment");
//!
//! // ABE_TEST_CONFIG_FILE, then the environment
//! let config = Config::load().expect("Failed to load config");
//! ```
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// Environment variable names
const ENV_TEST_DB: &str = "ABE_TEST_DB";
const ENV_TEST_MODE: &str = "ABE_TEST";
const ENV_CONFIG_FILE: &str = "ABE_TEST_CONFIG_FILE";

const QUICK_MODE: &str = "quick";
const FULL_MODE: &str = "full";

// Default configuration values
const DEFAULT_DIR_PREFIX: &str = "abe-test";
const DEFAULT_READY_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_READY_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

const QUICK_BACKENDS: &[&str] = &["sqlite3"];
const FULL_BACKENDS: &[&str] = &["sqlite3", "mysql", "postgres"];

/// Validates an identifier that is interpolated into administrative SQL.
///
/// Must start with a letter or underscore, continue with letters, digits or
/// underscores, and fit in 64 bytes.
pub(crate) fn validate_identifier(field: &str, identifier: &str) -> Result<()> {
    let invalid = |message: String| Error::InvalidConfig {
        field: field.to_string(),
        message,
    };

    let Some(first_char) = identifier.chars().next() else {
        return Err(invalid("cannot be empty".to_string()));
    };

    if identifier.len() > 64 {
        return Err(invalid(format!(
            "'{}' exceeds maximum length of 64 bytes",
            identifier
        )));
    }

    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(invalid(format!(
            "'{}' must start with a letter or underscore",
            identifier
        )));
    }

    if let Some(c) = identifier
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_')
    {
        return Err(invalid(format!(
            "'{}' contains invalid character '{}'",
            identifier, c
        )));
    }

    Ok(())
}

/// Which backends a test run should exercise.
///
/// In YAML this is either a mode name (`quick`, `full`) or a list of identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SelectionRepr", into = "SelectionRepr")]
pub enum BackendSelection {
    /// Exactly these identifiers, in this order.
    Explicit(Vec<String>),
    /// The embedded backend only.
    Quick,
    /// Every backend the crate knows about.
    Full,
}

impl BackendSelection {
    /// Parse a whitespace-separated list of backend identifiers.
    pub fn explicit(list: &str) -> Self {
        Self::Explicit(list.split_whitespace().map(str::to_string).collect())
    }

    /// The backend identifiers this selection stands for.
    pub fn resolve(&self) -> Vec<String> {
        match self {
            Self::Explicit(names) => names.clone(),
            Self::Quick => QUICK_BACKENDS.iter().map(|s| s.to_string()).collect(),
            Self::Full => FULL_BACKENDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for BackendSelection {
    fn default() -> Self {
        Self::Full
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SelectionRepr {
    List(Vec<String>),
    Mode(String),
}

impl TryFrom<SelectionRepr> for BackendSelection {
    type Error = String;

    fn try_from(repr: SelectionRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            SelectionRepr::List(names) => Ok(Self::Explicit(names)),
            SelectionRepr::Mode(mode) => match mode.as_str() {
                QUICK_MODE => Ok(Self::Quick),
                FULL_MODE => Ok(Self::Full),
                other => Err(format!(
                    "unknown backend selection '{}', expected '{}', '{}' or a list",
                    other, QUICK_MODE, FULL_MODE
                )),
            },
        }
    }
}

impl From<BackendSelection> for SelectionRepr {
    fn from(selection: BackendSelection) -> Self {
        match selection {
            BackendSelection::Explicit(names) => Self::List(names),
            BackendSelection::Quick => Self::Mode(QUICK_MODE.to_string()),
            BackendSelection::Full => Self::Mode(FULL_MODE.to_string()),
        }
    }
}

/// How the MySQL toolchain is invoked and which account/schema is bootstrapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MysqlConfig {
    /// Program that initializes the data directory
    #[serde(default = "default_install_bin")]
    pub install_bin: String,
    /// Extra arguments for the install program, after `--defaults-file`
    #[serde(default)]
    pub install_args: Vec<String>,
    /// Server program
    #[serde(default = "default_server_bin")]
    pub server_bin: String,
    /// Administrative client used to request shutdown
    #[serde(default = "default_admin_bin")]
    pub admin_bin: String,
    /// Administrative account, trusted on the private socket
    #[serde(default = "default_root_user")]
    pub root_user: String,
    /// Dedicated low-privilege account created for the test
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Application schema the dedicated account owns
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_install_bin() -> String {
    "mysql_install_db".to_string()
}

fn default_server_bin() -> String {
    "mysqld".to_string()
}

fn default_admin_bin() -> String {
    "mysqladmin".to_string()
}

fn default_root_user() -> String {
    "root".to_string()
}

fn default_user() -> String {
    "abe".to_string()
}

fn default_password() -> String {
    "Bitcoin".to_string()
}

fn default_database() -> String {
    "abe".to_string()
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            install_bin: default_install_bin(),
            install_args: Vec::new(),
            server_bin: default_server_bin(),
            admin_bin: default_admin_bin(),
            root_user: default_root_user(),
            user: default_user(),
            password: default_password(),
            database: default_database(),
        }
    }
}

impl MysqlConfig {
    /// Check every value that ends up inside administrative SQL.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("mysql.root_user", &self.root_user)?;
        validate_identifier("mysql.user", &self.user)?;
        validate_identifier("mysql.database", &self.database)?;
        if self.user == self.root_user {
            return Err(Error::InvalidConfig {
                field: "mysql.user".to_string(),
                message: "dedicated account must differ from the administrative account"
                    .to_string(),
            });
        }
        if self.password.contains(['\'', '"', '\\']) {
            return Err(Error::InvalidConfig {
                field: "mysql.password".to_string(),
                message: "must not contain quotes or backslashes".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for abe-testdb.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backends to exercise
    #[serde(default)]
    pub backends: BackendSelection,
    /// Parent directory for private working directories
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,
    /// Prefix of every working directory name
    #[serde(default = "default_dir_prefix")]
    pub dir_prefix: String,
    /// Upper bound on waiting for a started server to accept connections
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    /// Delay between readiness probes
    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,
    /// Upper bound on waiting for a server to exit after shutdown was requested
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default)]
    pub mysql: MysqlConfig,
}

// Default functions for serde
fn default_temp_root() -> PathBuf {
    std::env::temp_dir()
}

fn default_dir_prefix() -> String {
    DEFAULT_DIR_PREFIX.to_string()
}

fn default_ready_timeout_ms() -> u64 {
    DEFAULT_READY_TIMEOUT_MS
}

fn default_ready_poll_interval_ms() -> u64 {
    DEFAULT_READY_POLL_INTERVAL_MS
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backends: BackendSelection::default(),
            temp_root: default_temp_root(),
            dir_prefix: default_dir_prefix(),
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            ready_poll_interval_ms: DEFAULT_READY_POLL_INTERVAL_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            mysql: MysqlConfig::default(),
        }
    }
}

impl Config {
    /// Set the backend selection.
    pub fn with_backends(mut self, backends: BackendSelection) -> Self {
        self.backends = backends;
        self
    }

    /// Set the parent directory for working directories.
    pub fn with_temp_root<P: Into<PathBuf>>(mut self, temp_root: P) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    /// Set the readiness timeout and poll interval.
    pub fn with_ready_timeout(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.ready_timeout_ms = timeout.as_millis() as u64;
        self.ready_poll_interval_ms = poll_interval.as_millis() as u64;
        self
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Backend identifiers selected by this configuration.
    pub fn backend_names(&self) -> Vec<String> {
        self.backends.resolve()
    }

    /// Create config from environment variables
    ///
    /// Environment variables supported:
    /// - ABE_TEST_DB: whitespace-separated backend identifiers (an empty value selects nothing)
    /// - ABE_TEST: `quick` restricts the run to the embedded backend
    ///
    /// With neither set every backend is selected. All other fields use defaults.
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_backends(backends_from_env()))
    }

    /// Load configuration from a YAML file
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Example YAML
    /// ```yaml
    /// backends: quick
    /// ready_timeout_ms: 60000
    /// mysql:
    ///   install_bin: mysqld
    ///   install_args: ["--initialize-insecure"]
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
            field: "file".to_string(),
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        let config: Config = serde_yaml::from_str(&content).map_err(|e| Error::InvalidConfig {
            field: "yaml".to_string(),
            message: format!("Failed to parse YAML config: {}", e),
        })?;

        config.mysql.validate()?;
        Ok(config)
    }

    /// Create config from multiple sources with priority order
    ///
    /// 1. Config file named by ABE_TEST_CONFIG_FILE
    /// 2. Environment variables (ABE_TEST_DB, ABE_TEST)
    ///
    /// When a config file is used, the backend environment variables still override its
    /// backend selection if they are set.
    pub fn load() -> Result<Self> {
        Self::load_with_options(None::<PathBuf>)
    }

    /// Same as [`load`](Self::load) with an explicit config file taking precedence.
    pub fn load_with_options<P: AsRef<Path>>(explicit_config_path: Option<P>) -> Result<Self> {
        let file = match explicit_config_path {
            Some(path) => Some(path.as_ref().to_path_buf()),
            None => std::env::var(ENV_CONFIG_FILE).ok().map(PathBuf::from),
        };

        match file {
            Some(path) => {
                let mut config = Self::from_file(path)?;
                if backends_set_in_env() {
                    config.backends = backends_from_env();
                }
                Ok(config)
            }
            None => Self::from_env(),
        }
    }
}

fn backends_set_in_env() -> bool {
    std::env::var_os(ENV_TEST_DB).is_some() || std::env::var_os(ENV_TEST_MODE).is_some()
}

fn backends_from_env() -> BackendSelection {
    if let Ok(list) = std::env::var(ENV_TEST_DB) {
        return BackendSelection::explicit(&list);
    }
    if std::env::var(ENV_TEST_MODE).as_deref() == Ok(QUICK_MODE) {
        return BackendSelection::Quick;
    }
    BackendSelection::Full
}
