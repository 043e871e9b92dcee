//! External process helpers shared by server backends.
use crate::error::{Error, Result};
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Human-readable rendering of a command for logs and errors.
pub fn describe(cmd: &Command) -> String {
    format!("{:?}", cmd.as_std())
}

/// Run a command to completion; any non-zero exit is an error.
pub async fn run_checked(cmd: &mut Command) -> Result<()> {
    let command = describe(cmd);
    tracing::debug!("Running {}", command);

    let status = cmd
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|source| Error::CommandSpawn {
            command: command.clone(),
            source,
        })?;

    if !status.success() {
        return Err(Error::CommandFailed {
            command,
            status: status.to_string(),
        });
    }
    Ok(())
}

/// Start a long-running server process in the background.
///
/// The child is killed if its handle is dropped without being waited on.
pub fn spawn_server(cmd: &mut Command) -> Result<Child> {
    let command = describe(cmd);
    tracing::debug!("Starting {}", command);

    cmd.stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| Error::CommandSpawn { command, source })
}

/// Kill a child and reap it. A child that already exited is just reaped.
pub async fn kill_and_reap(child: &mut Child) -> Result<()> {
    if let Some(status) = child
        .try_wait()
        .map_err(|source| Error::ProcessWait { source })?
    {
        tracing::debug!("Server process already exited with {}", status);
        return Ok(());
    }
    child
        .kill()
        .await
        .map_err(|source| Error::ProcessWait { source })
}
