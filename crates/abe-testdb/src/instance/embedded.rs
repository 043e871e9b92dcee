//! Embedded (in-process SQLite) instances.
//!
//! A transient instance lives in memory and disappears with its store. A file-backed
//! instance lives at a caller-chosen path; teardown deletes the file and insists that it
//! still exists.
use crate::bootstrap::{open_store, Bootstrap};
use crate::error::{Error, Result, TeardownFailures};
use crate::params::ConnectArgs;
use crate::store::Store;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const DBTYPE: &str = "sqlite3";

/// Companion files SQLite may leave next to the database in WAL mode.
const SIDECAR_SUFFIXES: &[&str] = &["-wal", "-shm"];

#[derive(Debug)]
enum Storage {
    Transient,
    File(PathBuf),
}

pub struct EmbeddedDb {
    storage: Storage,
    connect_args: ConnectArgs,
    store: Box<dyn Store>,
}

impl std::fmt::Debug for EmbeddedDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedDb")
            .field("storage", &self.storage)
            .field("connect_args", &self.connect_args)
            .finish()
    }
}

impl EmbeddedDb {
    /// Private in-memory database.
    pub async fn transient(bootstrap: &dyn Bootstrap) -> Result<Self> {
        let connect_args = ConnectArgs::memory();
        let store = open_store(bootstrap, DBTYPE, &connect_args).await?;
        tracing::debug!("Opened transient sqlite3 instance");
        Ok(Self {
            storage: Storage::Transient,
            connect_args,
            store,
        })
    }

    /// Database at `path`, created by the driver if missing.
    pub async fn file<P: Into<PathBuf>>(path: P, bootstrap: &dyn Bootstrap) -> Result<Self> {
        let path = path.into();
        let connect_args = ConnectArgs::path(path.display().to_string());
        let store = open_store(bootstrap, DBTYPE, &connect_args).await?;
        tracing::debug!("Opened sqlite3 instance at {}", path.display());
        Ok(Self {
            storage: Storage::File(path),
            connect_args,
            store,
        })
    }

    pub fn dbtype(&self) -> &str {
        DBTYPE
    }

    pub fn connect_args(&self) -> &ConnectArgs {
        &self.connect_args
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.storage, Storage::Transient)
    }

    /// Backing file, for file-backed instances.
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::File(path) => Some(path),
            Storage::Transient => None,
        }
    }

    /// Close the store and, for file-backed instances, delete the file.
    pub async fn delete(self) -> Result<()> {
        let mut failures = TeardownFailures::new();
        failures.record("close_store", self.store.close().await);
        if let Storage::File(path) = &self.storage {
            failures.record("remove_file", remove_database_file(path));
        }
        failures.into_result()
    }
}

fn remove_database_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::MissingDatabaseFile {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(Error::RemoveFile {
                path: path.to_path_buf(),
                source,
            })
        }
    }
    tracing::debug!("Removed {}", path.display());

    for suffix in SIDECAR_SUFFIXES {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        match std::fs::remove_file(&sidecar) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {:?}: {}", sidecar, e),
        }
    }
    Ok(())
}
