//! Test fixture adapter.
//!
//! ## What
//!
//! A [`Fixture`] lives as long as a test module. It knows which backends the module should
//! be run against (from the [`Config`] it was built with), creates at most one instance per
//! backend on first use, and tears every instance down in [`Fixture::finalize`], which the
//! module's teardown hook calls once after its last test.
//!
//! Backends that resolve to a skip are remembered, so their tests are skipped rather than
//! failed. A backend whose setup failed is remembered too: later requests get
//! [`Error::SetupFailed`] without provisioning again.
//!
//! ## How
//!
//! ```no_run
//! use abe_testdb::config::Config;
//! use abe_testdb::fixture::Fixture;
//!
//! # async fn example() -> abe_testdb::Result<()> {
//! let mut fixture = Fixture::new(Config::from_env()?);
//! for backend in fixture.params() {
//!     let Some(db) = fixture.get(&backend).await? else {
//!         continue; // skipped
//!     };
//!     assert_eq!(db.store().query_int("SELECT 1").await?, 1);
//! }
//! fixture.finalize().await?;
//! # Ok(())
//! # }
//! ```
use crate::bootstrap::{Bootstrap, SqlxBootstrap};
use crate::config::Config;
use crate::error::{Error, Result, TeardownFailures};
use crate::instance::{create_with, Provisioned, Skip, TestDb};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct Fixture {
    config: Config,
    bootstrap: Arc<dyn Bootstrap>,
    instances: BTreeMap<String, TestDb>,
    skipped: BTreeMap<String, Skip>,
    failed: BTreeMap<String, String>,
}

impl std::fmt::Debug for Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("backends", &self.config.backend_names())
            .field("instances", &self.instances)
            .field("skipped", &self.skipped)
            .field("failed", &self.failed)
            .finish()
    }
}

impl Fixture {
    pub fn new(config: Config) -> Self {
        Self::with_bootstrap(config, Arc::new(SqlxBootstrap))
    }

    pub fn with_bootstrap(config: Config, bootstrap: Arc<dyn Bootstrap>) -> Self {
        Self {
            config,
            bootstrap,
            instances: BTreeMap::new(),
            skipped: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Backend identifiers the module runs against, in configured order.
    pub fn params(&self) -> Vec<String> {
        self.config.backend_names()
    }

    /// The instance for `backend`, created on first request.
    ///
    /// `Ok(None)` means the backend is skipped. Setup runs at most once per backend: after a
    /// failure every later call returns [`Error::SetupFailed`].
    pub async fn get(&mut self, backend: &str) -> Result<Option<&TestDb>> {
        if let Some(message) = self.failed.get(backend) {
            return Err(Error::SetupFailed {
                backend: backend.to_string(),
                message: message.clone(),
            });
        }

        if !self.instances.contains_key(backend) && !self.skipped.contains_key(backend) {
            match create_with(Some(backend), &self.config, self.bootstrap.as_ref()).await {
                Ok(Provisioned::Ready(db)) => {
                    self.instances.insert(backend.to_string(), db);
                }
                Ok(Provisioned::Skipped(skip)) => {
                    tracing::info!("Skipping tests for {}: {}", backend, skip.reason);
                    self.skipped.insert(backend.to_string(), skip);
                }
                Err(e) => {
                    tracing::error!("Setup of {} failed: {}", backend, e);
                    self.failed.insert(backend.to_string(), e.to_string());
                    return Err(e);
                }
            }
        }
        Ok(self.instances.get(backend))
    }

    /// Backends that were requested and skipped so far.
    pub fn skipped(&self) -> impl Iterator<Item = &Skip> {
        self.skipped.values()
    }

    /// Backends whose setup failed, with the error message.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.failed.iter().map(|(b, m)| (b.as_str(), m.as_str()))
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Tear down every instance, reporting all failures together.
    pub async fn finalize(self) -> Result<()> {
        let mut failures = TeardownFailures::new();
        for (backend, db) in self.instances {
            tracing::debug!("Finalizing {} instance", backend);
            failures.record(format!("delete {}", backend), db.delete().await);
        }
        failures.into_result()
    }
}
