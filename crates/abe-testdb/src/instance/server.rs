//! Server-instance lifecycle.
//!
//! ## What
//!
//! A server instance is a throwaway database server owned by one test run. It lives in a
//! private, freshly created directory, listens only on a rendezvous socket inside that
//! directory, and carries one schema plus one unprivileged account for the code under test.
//!
//! [`ServerDb`] drives the instance through an explicit sequence of states:
//!
//! ```text
//! Created -> DirAllocated -> ServerInstalled -> ServerRunning -> AccountBootstrapped
//!         -> SchemaReady -> Active -> ShuttingDown -> ServerStopped -> DirRemoved -> Deleted
//! ```
//!
//! Any setup step may fail. The instance then releases exactly what it had acquired, in
//! reverse order, lands in [`ServerState::FailedDuringSetup`] and the original error is
//! returned. Cleanup problems during that unwind are logged, never raised over it.
//!
//! | reached           | reverse actions                                             |
//! |-------------------|-------------------------------------------------------------|
//! | DirAllocated      | remove directory                                            |
//! | ServerInstalled   | remove directory                                            |
//! | (started, unready)| kill and reap process, remove directory                     |
//! | ServerRunning     | request shutdown, wait, remove directory                    |
//! | AccountBootstrapped | same as ServerRunning                                     |
//! | SchemaReady       | drop schema, then as ServerRunning                          |
//!
//! ## How
//!
//! What "install", "start" or "create schema" mean is up to a [`ServerBackend`]. The
//! lifecycle only sequences the steps, waits for readiness and guarantees cleanup.
//!
//! Teardown runs every step even when an earlier one fails (close store, drop schema,
//! request shutdown, wait for exit, remove directory) and reports all failures together
//! as [`Error::Teardown`]. [`ServerDb::delete`] consumes the instance, so it can only be
//! torn down once.
use crate::bootstrap::{open_store, Bootstrap};
use crate::config::Config;
use crate::error::{Error, Result, TeardownFailures};
use crate::instance::process::kill_and_reap;
use crate::params::ConnectArgs;
use crate::store::Store;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Child;
use uuid::Uuid;

const DIR_SUFFIX_LEN: usize = 12;

/// Private working directory of one server instance.
#[derive(Debug)]
pub struct InstanceDir {
    path: PathBuf,
}

impl InstanceDir {
    /// Create `{root}/{prefix}-{12 hex digits}`. Fails rather than reuse an existing
    /// directory.
    ///
    /// The suffix is kept short: socket paths inside the directory must fit `sun_path`.
    pub fn allocate(root: &Path, prefix: &str) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|source| Error::CreateDir {
            path: root.to_path_buf(),
            source,
        })?;

        let suffix = Uuid::new_v4().simple().to_string();
        let path = root.join(format!("{}-{}", prefix, &suffix[..DIR_SUFFIX_LEN]));
        std::fs::create_dir(&path).map_err(|source| Error::CreateDir {
            path: path.clone(),
            source,
        })?;

        tracing::debug!("Allocated working directory {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.path.join(name)
    }

    /// Create a subdirectory and return its path.
    pub fn create_subdir(&self, name: &str) -> Result<PathBuf> {
        let path = self.join(name);
        std::fs::create_dir(&path).map_err(|source| Error::CreateDir {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Write a file into the directory and return its path.
    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.join(name);
        std::fs::write(&path, contents).map_err(|source| Error::WriteFile {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    fn remove(self) -> Result<()> {
        std::fs::remove_dir_all(&self.path).map_err(|source| Error::RemoveDir {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!("Removed working directory {}", self.path.display());
        Ok(())
    }
}

/// What a database server technology must provide to be provisioned.
///
/// Every method receives the instance's private directory; where the backend keeps its
/// files inside it is its own business.
#[async_trait]
pub trait ServerBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Driver identifier handed to the bootstrap entry point
    fn dbtype(&self) -> &str;

    /// Lay out files and initialize server data. Runs before the server starts.
    async fn install(&self, _dir: &InstanceDir) -> Result<()> {
        Ok(())
    }

    /// Launch the server in the background.
    fn start(&self, dir: &InstanceDir) -> Result<Child>;

    /// One readiness probe as the administrative user. `Ok` means ready.
    async fn ping(&self, dir: &InstanceDir) -> Result<()>;

    /// Create the unprivileged account used by the code under test.
    async fn bootstrap_account(&self, _dir: &InstanceDir) -> Result<()> {
        Ok(())
    }

    /// Create the schema and grant the account full rights on it, and only on it.
    async fn create_schema(&self, _dir: &InstanceDir) -> Result<()> {
        Ok(())
    }

    /// Parameters the code under test connects with.
    fn connect_args(&self, dir: &InstanceDir) -> ConnectArgs;

    async fn drop_schema(&self, _dir: &InstanceDir) -> Result<()> {
        Ok(())
    }

    /// Ask the server to stop. Returning does not mean it has exited.
    async fn shutdown(&self, dir: &InstanceDir) -> Result<()>;
}

/// Lifecycle states of a server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServerState {
    Created,
    DirAllocated,
    ServerInstalled,
    ServerRunning,
    AccountBootstrapped,
    SchemaReady,
    Active,
    ShuttingDown,
    ServerStopped,
    DirRemoved,
    Deleted,
    FailedDuringSetup,
}

/// Process, directory and state of one server instance, without the store.
struct Lifecycle {
    backend: Box<dyn ServerBackend>,
    state: ServerState,
    dir: Option<InstanceDir>,
    server: Option<Child>,
    shutdown_timeout: Duration,
}

impl Lifecycle {
    fn advance(&mut self, next: ServerState) {
        tracing::debug!(
            "{} instance: {:?} -> {:?}",
            self.backend.name(),
            self.state,
            next
        );
        self.state = next;
    }

    fn dir(&self) -> Result<&InstanceDir> {
        self.dir.as_ref().ok_or_else(|| Error::Internal {
            message: "server working directory already removed".to_string(),
        })
    }

    /// Install, start, wait for readiness, create account and schema.
    async fn setup(&mut self, ready_timeout: Duration, poll_interval: Duration) -> Result<()> {
        self.backend.install(self.dir()?).await?;
        self.advance(ServerState::ServerInstalled);

        let child = self.backend.start(self.dir()?)?;
        tracing::info!(
            "Started {} server (pid {:?}) in {}",
            self.backend.name(),
            child.id(),
            self.dir()?.path().display()
        );
        self.server = Some(child);

        self.wait_until_ready(ready_timeout, poll_interval).await?;
        self.advance(ServerState::ServerRunning);

        self.backend.bootstrap_account(self.dir()?).await?;
        self.advance(ServerState::AccountBootstrapped);

        self.backend.create_schema(self.dir()?).await?;
        self.advance(ServerState::SchemaReady);
        Ok(())
    }

    /// Poll the backend until it answers, the process dies or the deadline passes.
    async fn wait_until_ready(&mut self, timeout: Duration, poll_interval: Duration) -> Result<()> {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if let Some(server) = self.server.as_mut() {
                if let Some(status) = server
                    .try_wait()
                    .map_err(|source| Error::ProcessWait { source })?
                {
                    return Err(Error::ServerExited {
                        status: status.to_string(),
                    });
                }
            }

            let remaining = timeout.saturating_sub(started.elapsed());
            let last_error =
                match tokio::time::timeout(remaining, self.backend.ping(self.dir()?)).await {
                    Ok(Ok(())) => {
                        tracing::debug!(
                            "{} server ready after {} attempt(s)",
                            self.backend.name(),
                            attempt
                        );
                        return Ok(());
                    }
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => "readiness probe timed out".to_string(),
                };

            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(Error::ServerNotReady {
                    timeout,
                    last_error,
                });
            }

            tracing::trace!("Server not ready (attempt {}): {}", attempt, last_error);
            tokio::time::sleep(poll_interval.min(remaining)).await;
        }
    }

    /// Reverse whatever a failed setup acquired. Never raises.
    async fn unwind(&mut self) {
        tracing::warn!(
            "Setup of {} instance failed in state {:?}, cleaning up",
            self.backend.name(),
            self.state
        );

        let mut failures = TeardownFailures::new();
        if self.state >= ServerState::ServerRunning {
            self.release(&mut failures).await;
        } else {
            if let Some(mut server) = self.server.take() {
                failures.record("kill_server", kill_and_reap(&mut server).await);
            }
            failures.record("remove_dir", self.remove_dir());
        }
        self.state = ServerState::FailedDuringSetup;

        if !failures.is_empty() {
            tracing::warn!("Cleanup after failed setup was incomplete: {}", failures);
        }
    }

    /// Drop schema, stop the server, remove the directory. Every step runs.
    async fn release(&mut self, failures: &mut TeardownFailures) {
        if self.state >= ServerState::SchemaReady {
            match self.dir() {
                Ok(dir) => failures.record("drop_schema", self.backend.drop_schema(dir).await),
                Err(e) => failures.record("drop_schema", Err(e)),
            }
        }

        if let Some(mut server) = self.server.take() {
            self.advance(ServerState::ShuttingDown);
            let requested = match self.dir() {
                Ok(dir) => self.backend.shutdown(dir).await,
                Err(e) => Err(e),
            };
            let graceful = requested.is_ok();
            failures.record("shutdown", requested);
            failures.record("wait", self.wait_for_exit(&mut server, graceful).await);
            self.advance(ServerState::ServerStopped);
        }

        failures.record("remove_dir", self.remove_dir());
    }

    /// Wait for the server to exit after a shutdown request, killing it on timeout.
    /// Without a successful request there is nothing to wait for: kill straight away.
    async fn wait_for_exit(&self, server: &mut Child, graceful: bool) -> Result<()> {
        if !graceful {
            return kill_and_reap(server).await;
        }

        match tokio::time::timeout(self.shutdown_timeout, server.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!("{} server exited with {}", self.backend.name(), status);
                Ok(())
            }
            Ok(Err(source)) => {
                kill_and_reap(server).await?;
                Err(Error::ProcessWait { source })
            }
            Err(_) => {
                tracing::warn!(
                    "{} server still running {:?} after shutdown request, killing it",
                    self.backend.name(),
                    self.shutdown_timeout
                );
                kill_and_reap(server).await?;
                Err(Error::ShutdownTimeout {
                    timeout: self.shutdown_timeout,
                })
            }
        }
    }

    fn remove_dir(&mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => {
                dir.remove()?;
                self.advance(ServerState::DirRemoved);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// A running, bootstrapped server instance with an open store.
pub struct ServerDb {
    lifecycle: Lifecycle,
    connect_args: ConnectArgs,
    store: Box<dyn Store>,
}

impl std::fmt::Debug for ServerDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDb")
            .field("backend", &self.lifecycle.backend.name())
            .field("state", &self.lifecycle.state)
            .field("dir", &self.lifecycle.dir)
            .field("pid", &self.server_pid())
            .field("connect_args", &self.connect_args)
            .finish()
    }
}

impl ServerDb {
    /// Provision a server instance and open a store on it through `bootstrap`.
    ///
    /// On failure everything acquired so far has been released and the error of the
    /// failing step is returned.
    pub async fn create(
        backend: Box<dyn ServerBackend>,
        config: &Config,
        bootstrap: &dyn Bootstrap,
    ) -> Result<Self> {
        let dir = InstanceDir::allocate(&config.temp_root, &config.dir_prefix)?;
        let connect_args = backend.connect_args(&dir);

        let mut lifecycle = Lifecycle {
            backend,
            state: ServerState::Created,
            dir: Some(dir),
            server: None,
            shutdown_timeout: config.shutdown_timeout(),
        };
        lifecycle.advance(ServerState::DirAllocated);

        if let Err(e) = lifecycle
            .setup(config.ready_timeout(), config.ready_poll_interval())
            .await
        {
            lifecycle.unwind().await;
            return Err(e);
        }

        let store = match open_store(bootstrap, lifecycle.backend.dbtype(), &connect_args).await {
            Ok(store) => store,
            Err(e) => {
                lifecycle.unwind().await;
                return Err(e);
            }
        };

        lifecycle.advance(ServerState::Active);
        tracing::info!(
            "{} instance ready in {:?}",
            lifecycle.backend.name(),
            lifecycle.dir.as_ref().map(InstanceDir::path)
        );

        Ok(Self {
            lifecycle,
            connect_args,
            store,
        })
    }

    pub fn name(&self) -> &str {
        self.lifecycle.backend.name()
    }

    pub fn dbtype(&self) -> &str {
        self.lifecycle.backend.dbtype()
    }

    pub fn state(&self) -> ServerState {
        self.lifecycle.state
    }

    pub fn connect_args(&self) -> &ConnectArgs {
        &self.connect_args
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.lifecycle.dir.as_ref().map(InstanceDir::path)
    }

    pub fn server_pid(&self) -> Option<u32> {
        self.lifecycle.server.as_ref().and_then(Child::id)
    }

    /// Tear the instance down. Every step is attempted; all failures are returned together.
    pub async fn delete(mut self) -> Result<()> {
        tracing::info!("Deleting {} instance", self.name());

        let mut failures = TeardownFailures::new();
        failures.record("close_store", self.store.close().await);
        self.lifecycle.release(&mut failures).await;
        self.lifecycle.advance(ServerState::Deleted);

        failures.into_result()
    }
}
