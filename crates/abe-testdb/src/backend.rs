//! Backend selection.
//!
//! Maps a requested backend identifier (short name or driver-module name, any case) to a
//! [`BackendType`]. Identifiers nobody recognizes are not an error: they come back as
//! [`Selection::Unsupported`] so the caller can skip the backend.
use std::fmt;

/// Database technologies this crate can provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// In-process SQLite, transient or file-backed
    Sqlite,
    /// Throwaway `mysqld` in a private directory
    Mysql,
    /// Recognized, never provisioned
    Postgres,
}

impl BackendType {
    const SQLITE_ALIASES: &'static [&'static str] = &["sqlite3", "sqlite"];
    const MYSQL_ALIASES: &'static [&'static str] = &["mysql", "mysqldb"];
    const POSTGRES_ALIASES: &'static [&'static str] =
        &["postgres", "postgresql", "pg", "psycopg2"];

    /// Resolve an identifier. `None` selects the default, embedded backend.
    pub fn select(requested: Option<&str>) -> Selection {
        let Some(requested) = requested else {
            return Selection::Supported(Self::Sqlite);
        };

        let name = requested.trim().to_ascii_lowercase();
        let backend = if Self::SQLITE_ALIASES.contains(&name.as_str()) {
            Self::Sqlite
        } else if Self::MYSQL_ALIASES.contains(&name.as_str()) {
            Self::Mysql
        } else if Self::POSTGRES_ALIASES.contains(&name.as_str()) {
            Self::Postgres
        } else {
            return Selection::Unsupported {
                requested: requested.to_string(),
            };
        };

        Selection::Supported(backend)
    }

    /// Short name used in logs and test output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite3",
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// Driver identifier passed to the bootstrap entry point as `--dbtype`.
    pub fn dbtype(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite3",
            Self::Mysql => "MySQLdb",
            Self::Postgres => "psycopg2",
        }
    }

    /// Map a `--dbtype` value back to its backend.
    pub fn from_dbtype(dbtype: &str) -> Option<Self> {
        match Self::select(Some(dbtype)) {
            Selection::Supported(backend) => Some(backend),
            Selection::Unsupported { .. } => None,
        }
    }

    /// Why this backend cannot be provisioned, if it cannot.
    pub fn unavailable_reason(&self) -> Option<&'static str> {
        match self {
            Self::Postgres => Some("not implemented"),
            Self::Sqlite | Self::Mysql => None,
        }
    }

    pub fn is_server(&self) -> bool {
        !matches!(self, Self::Sqlite)
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of resolving a backend identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Supported(BackendType),
    /// Skip signal, not a failure
    Unsupported { requested: String },
}
