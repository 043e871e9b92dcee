//! Scripted server backend built from `sh` processes.
//!
//! The "server" is a shell loop that marks itself ready by touching `ready` in its working
//! directory and exits once `stop` appears there. Each knob makes one lifecycle step
//! misbehave.
use abe_testdb::error::{Error, Result};
use abe_testdb::instance::process::{run_checked, spawn_server};
use abe_testdb::instance::{InstanceDir, ServerBackend};
use abe_testdb::ConnectArgs;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::process::{Child, Command};

const SERVE: &str = r#"touch "$1/ready"; while [ ! -f "$1/stop" ]; do sleep 0.05; done"#;
const SERVE_NEVER_READY: &str = r#"while [ ! -f "$1/stop" ]; do sleep 0.05; done"#;
const SERVE_IGNORING_STOP: &str = r#"trap '' TERM; touch "$1/ready"; while true; do sleep 0.05; done"#;
const CRASH: &str = "exit 7";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behavior {
    #[default]
    Healthy,
    FailInstall,
    CrashOnStart,
    NeverReady,
    FailAccount,
    FailSchema,
    FailShutdown,
    IgnoreShutdown,
}

/// What the backend saw, shared with the test.
#[derive(Debug, Default)]
pub struct Observed {
    pub dir: Option<PathBuf>,
    pub pid: Option<u32>,
    pub steps: Vec<&'static str>,
}

pub struct FakeServer {
    behavior: Behavior,
    dbtype: &'static str,
    observed: Arc<Mutex<Observed>>,
}

impl FakeServer {
    pub fn new(behavior: Behavior) -> (Self, Arc<Mutex<Observed>>) {
        Self::with_dbtype(behavior, "sqlite3")
    }

    /// A dbtype the default entry point does not know makes the bootstrap step fail.
    pub fn with_dbtype(behavior: Behavior, dbtype: &'static str) -> (Self, Arc<Mutex<Observed>>) {
        let observed = Arc::new(Mutex::new(Observed::default()));
        let server = Self {
            behavior,
            dbtype,
            observed: observed.clone(),
        };
        (server, observed)
    }

    fn step(&self, name: &'static str) {
        self.observed.lock().unwrap().steps.push(name);
    }
}

#[async_trait]
impl ServerBackend for FakeServer {
    fn name(&self) -> &str {
        "fake"
    }

    fn dbtype(&self) -> &str {
        self.dbtype
    }

    async fn install(&self, dir: &InstanceDir) -> Result<()> {
        self.step("install");
        self.observed.lock().unwrap().dir = Some(dir.path().to_path_buf());
        dir.write_file("fake.cnf", "[fake]\n")?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(if self.behavior == Behavior::FailInstall {
            "exit 1"
        } else {
            "exit 0"
        });
        run_checked(&mut cmd).await
    }

    fn start(&self, dir: &InstanceDir) -> Result<Child> {
        self.step("start");
        let script = match self.behavior {
            Behavior::CrashOnStart => CRASH,
            Behavior::NeverReady => SERVE_NEVER_READY,
            Behavior::IgnoreShutdown => SERVE_IGNORING_STOP,
            _ => SERVE,
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script).arg("fake-server").arg(dir.path());
        let child = spawn_server(&mut cmd)?;
        self.observed.lock().unwrap().pid = child.id();
        Ok(child)
    }

    async fn ping(&self, dir: &InstanceDir) -> Result<()> {
        if dir.join("ready").exists() {
            Ok(())
        } else {
            Err(Error::Internal {
                message: "not listening yet".to_string(),
            })
        }
    }

    async fn bootstrap_account(&self, _dir: &InstanceDir) -> Result<()> {
        self.step("bootstrap_account");
        if self.behavior == Behavior::FailAccount {
            return Err(Error::CommandFailed {
                command: "CREATE USER".to_string(),
                status: "access denied".to_string(),
            });
        }
        Ok(())
    }

    async fn create_schema(&self, dir: &InstanceDir) -> Result<()> {
        self.step("create_schema");
        if self.behavior == Behavior::FailSchema {
            return Err(Error::CommandFailed {
                command: "CREATE DATABASE".to_string(),
                status: "database exists".to_string(),
            });
        }
        dir.write_file("schema", "")?;
        Ok(())
    }

    fn connect_args(&self, _dir: &InstanceDir) -> ConnectArgs {
        ConnectArgs::memory()
    }

    async fn drop_schema(&self, dir: &InstanceDir) -> Result<()> {
        self.step("drop_schema");
        std::fs::remove_file(dir.join("schema")).map_err(|e| Error::Internal {
            message: e.to_string(),
        })
    }

    async fn shutdown(&self, dir: &InstanceDir) -> Result<()> {
        self.step("shutdown");
        if self.behavior == Behavior::FailShutdown {
            return Err(Error::CommandFailed {
                command: "fake-admin shutdown".to_string(),
                status: "exit status: 1".to_string(),
            });
        }
        dir.write_file("stop", "")?;
        Ok(())
    }
}
