//! Error types and result handling for abe-testdb.
//!
//! ## What
//!
//! - [`Error`] enumerates every fatal condition that can occur while provisioning or
//!   tearing down a test database: filesystem, external command, readiness, driver,
//!   configuration and bootstrap failures.
//! - [`Result<T>`] is a convenient alias for `Result<T, Error>`.
//! - [`TeardownFailures`] collects every failed teardown step so that one failing step
//!   never hides another.
//!
//! ## How
//!
//! An unknown or unavailable backend is not an error. Selection and creation return a
//! typed skip outcome instead (see [`crate::backend::Selection`] and
//! [`crate::instance::Provisioned`]).
//!
//! ```rust
//! use abe_testdb::error::{Error, Result};
//!
//! fn check_password(password: &str) -> Result<()> {
//!     if password.contains('\'') {
//!         return Err(Error::InvalidConfig {
//!             field: "mysql.password".to_string(),
//!             message: "must not contain quotes".to_string(),
//!         });
//!     }
//!     Ok(())
//! }
//! # assert!(check_password("it's").is_err());
//! ```
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for abe-testdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type for heterogeneous error sources
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for abe-testdb operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (SQLx errors)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bootstrap command line could not be parsed
    #[error("Invalid bootstrap command line: {0}")]
    CommandLine(#[from] clap::Error),

    /// Configuration field has an invalid value
    #[error("Invalid configuration value for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Connection parameters do not fit the requested backend
    #[error("Invalid connection arguments for {dbtype}: {message}")]
    InvalidConnectArgs { dbtype: String, message: String },

    /// The private working directory could not be created
    #[error("Failed to create working directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The private working directory could not be removed
    #[error("Failed to remove working directory {path}: {source}")]
    RemoveDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A file inside the working directory could not be written
    #[error("Failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file behind a file-backed embedded instance is gone at teardown
    #[error("Database file {path} does not exist")]
    MissingDatabaseFile { path: PathBuf },

    /// The file behind a file-backed embedded instance could not be deleted
    #[error("Failed to remove database file {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An external program could not be started
    #[error("Failed to run '{command}': {source}")]
    CommandSpawn {
        command: String,
        source: std::io::Error,
    },

    /// An external program exited unsuccessfully
    #[error("Command '{command}' failed with {status}")]
    CommandFailed { command: String, status: String },

    /// The server process exited while we were waiting for it to accept connections
    #[error("Server process exited before becoming ready ({status})")]
    ServerExited { status: String },

    /// The server never answered the readiness probe
    #[error("Server did not become ready within {timeout:?}: {last_error}")]
    ServerNotReady {
        timeout: Duration,
        last_error: String,
    },

    /// The server did not exit after shutdown was requested and had to be killed
    #[error("Server did not exit within {timeout:?} of shutdown request")]
    ShutdownTimeout { timeout: Duration },

    /// Waiting on the server process failed
    #[error("Failed to wait for server process: {source}")]
    ProcessWait { source: std::io::Error },

    /// Database connection failed or was lost
    #[error("Database connection failed: {source}. Context: {context}")]
    ConnectionFailed { source: BoxError, context: String },

    /// SQL query failed
    #[error("Database query failed: {query}. Context: {context}. Source: {source}")]
    QueryFailed {
        source: BoxError,
        query: String,
        context: String,
    },

    /// The bootstrap entry point refused the parameters; the original error is kept as source
    #[error("Bootstrap entry point failed: {0}")]
    Bootstrap(#[source] BoxError),

    /// An earlier attempt to set up this backend failed; it is not retried
    #[error("Setup of {backend} failed earlier: {message}")]
    SetupFailed { backend: String, message: String },

    /// One or more teardown steps failed
    #[error(transparent)]
    Teardown(TeardownFailures),

    /// Unexpected internal error occurred
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Every teardown step that failed, in the order the steps ran.
#[derive(Debug, Default)]
pub struct TeardownFailures {
    failures: Vec<(String, Error)>,
}

impl TeardownFailures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one teardown step.
    pub fn record(&mut self, step: impl Into<String>, outcome: Result<()>) {
        if let Err(e) = outcome {
            let step = step.into();
            tracing::warn!("Teardown step '{}' failed: {}", step, e);
            self.failures.push((step, e));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Names of the failed steps.
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(step, _)| step.as_str())
    }

    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.failures.iter().map(|(_, e)| e)
    }

    /// `Ok(())` when nothing failed, otherwise [`Error::Teardown`].
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Teardown(self))
        }
    }
}

impl fmt::Display for TeardownFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Teardown failed in {} step(s)", self.failures.len())?;
        for (step, e) in &self.failures {
            write!(f, "; {}: {}", step, e)?;
        }
        Ok(())
    }
}

impl std::error::Error for TeardownFailures {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_failures_collects_in_order() {
        let mut failures = TeardownFailures::new();
        failures.record("close_store", Ok(()));
        failures.record(
            "shutdown",
            Err(Error::CommandFailed {
                command: "mysqladmin shutdown".to_string(),
                status: "exit status: 1".to_string(),
            }),
        );
        failures.record(
            "remove_dir",
            Err(Error::Internal {
                message: "boom".to_string(),
            }),
        );

        assert_eq!(failures.len(), 2);
        assert_eq!(failures.steps().collect::<Vec<_>>(), vec!["shutdown", "remove_dir"]);

        let message = failures.to_string();
        assert!(message.starts_with("Teardown failed in 2 step(s)"));
        assert!(message.contains("mysqladmin shutdown"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_empty_teardown_is_ok() {
        assert!(TeardownFailures::new().into_result().is_ok());
    }
}
