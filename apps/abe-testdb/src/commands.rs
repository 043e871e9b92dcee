use abe_testdb::{create_with, resolve, Config, ConnectArgs, Provisioned, SqlxBootstrap, TestDb};
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;

/// Everything a client needs to reach an instance.
#[derive(Debug, Serialize)]
struct Descriptor<'a> {
    backend: &'a str,
    dbtype: &'a str,
    connect_args: &'a ConnectArgs,
    cmdline: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl<'a> Descriptor<'a> {
    fn of(db: &'a TestDb) -> anyhow::Result<Self> {
        Ok(Self {
            backend: db.name(),
            dbtype: db.dbtype(),
            connect_args: db.connect_args(),
            cmdline: db.cmdline()?,
            working_dir: db.working_dir().map(PathBuf::from),
        })
    }
}

fn write_line(out: &mut dyn Write, value: &serde_json::Value) -> anyhow::Result<()> {
    writeln!(out, "{}", serde_json::to_string(value)?)?;
    Ok(())
}

pub fn backends(config: &Config, out: &mut dyn Write) -> anyhow::Result<()> {
    for name in config.backend_names() {
        let line = match resolve(Some(name.as_str())) {
            Ok(backend) => json!({
                "backend": name,
                "status": "supported",
                "resolved": backend.name(),
                "dbtype": backend.dbtype(),
            }),
            Err(skip) => json!({
                "backend": name,
                "status": "skipped",
                "reason": skip.reason,
            }),
        };
        write_line(out, &line)?;
    }
    Ok(())
}

pub async fn up(config: &Config, backend: Option<&str>, out: &mut dyn Write) -> anyhow::Result<()> {
    let db = match create_with(backend, config, &SqlxBootstrap).await? {
        Provisioned::Ready(db) => db,
        Provisioned::Skipped(skip) => anyhow::bail!("{}", skip),
    };

    let printed = print_descriptor(&db, out);

    if printed.is_ok() {
        tracing::info!("{} instance is up, press Ctrl-C to tear it down", db.name());
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        }
    }

    // Tear down even if printing failed
    db.delete().await?;
    tracing::info!("Instance deleted");
    printed
}

fn print_descriptor(db: &TestDb, out: &mut dyn Write) -> anyhow::Result<()> {
    let descriptor = serde_json::to_string_pretty(&Descriptor::of(db)?)?;
    writeln!(out, "{}", descriptor)?;
    out.flush()?;
    Ok(())
}

pub async fn check(config: &Config, backends: Vec<String>, out: &mut dyn Write) -> anyhow::Result<()> {
    let backends = if backends.is_empty() {
        config.backend_names()
    } else {
        backends
    };

    let mut failed = 0;
    for name in backends {
        let line = match create_with(Some(name.as_str()), config, &SqlxBootstrap).await {
            Ok(Provisioned::Ready(db)) => match db.delete().await {
                Ok(()) => json!({ "backend": name, "status": "ok" }),
                Err(e) => {
                    failed += 1;
                    json!({ "backend": name, "status": "teardown_failed", "error": e.to_string() })
                }
            },
            Ok(Provisioned::Skipped(skip)) => {
                json!({ "backend": name, "status": "skipped", "reason": skip.reason })
            }
            Err(e) => {
                failed += 1;
                json!({ "backend": name, "status": "failed", "error": e.to_string() })
            }
        };
        write_line(out, &line)?;
    }

    if failed > 0 {
        anyhow::bail!("{} backend(s) failed", failed);
    }
    Ok(())
}
