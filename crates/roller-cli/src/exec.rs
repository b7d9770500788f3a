use std::process::{
    ExitStatus,
    Stdio,
};

use color_eyre::eyre::{
    self,
    WrapErr as _,
};
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::{
    debug,
    instrument,
};

/// The gRPC status cosmos-sdk CLIs print when a queried object does not exist.
const GRPC_NOT_FOUND: &str = "code = NotFound";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ExecError {
    #[error("failed to run `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}: {}", summary(.stderr, .stdout))]
    Failed {
        program: String,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
}

impl ExecError {
    /// Whether the command failed because the queried object does not exist (yet).
    pub(crate) fn is_not_found(&self) -> bool {
        match self {
            Self::Failed {
                stdout,
                stderr,
                ..
            } => stderr.contains(GRPC_NOT_FOUND) || stdout.contains(GRPC_NOT_FOUND),
            Self::Spawn {
                ..
            } => false,
        }
    }
}

fn summary<'a>(stderr: &'a str, stdout: &'a str) -> &'a str {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        stdout.trim()
    } else {
        stderr
    }
}

/// Runs `cmd` to completion and returns its stdout.
#[instrument(skip_all, fields(command = ?cmd.as_std()), err)]
pub(crate) async fn stdout(mut cmd: Command) -> Result<Vec<u8>, ExecError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(ExecError::Failed {
            program,
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    debug!(bytes = output.stdout.len(), "command succeeded");
    Ok(output.stdout)
}

/// Runs `cmd` and parses its stdout as a single JSON document.
pub(crate) async fn json<T: DeserializeOwned>(cmd: Command) -> eyre::Result<T> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let out = stdout(cmd).await?;
    serde_json::from_slice(&out)
        .wrap_err_with(|| format!("failed to parse the json output of `{program}`"))
}

/// Parses output that holds one JSON document per line, skipping blank lines.
pub(crate) fn json_lines<T: DeserializeOwned>(out: &[u8]) -> eyre::Result<Vec<T>> {
    String::from_utf8_lossy(out)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).wrap_err_with(|| format!("failed to parse json line `{line}`"))
        })
        .collect()
}
