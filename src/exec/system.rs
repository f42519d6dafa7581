//! Command runner backed by `tokio::process`

use super::{CommandRunner, CommandSpec};
use crate::error::{SupplyError, SupplyResult};
use crate::ui;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

/// Launches real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommand;

impl SystemCommand {
    /// Create a new system command runner
    pub fn new() -> Self {
        Self
    }

    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.dir)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl CommandRunner for SystemCommand {
    async fn run(&self, spec: &CommandSpec) -> SupplyResult<()> {
        debug!("Executing: {} (in {})", spec, spec.dir.display());

        let mut child = Self::command(spec)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SupplyError::command_failed(spec.to_string(), e))?;

        stream_child_output(&mut child, &|line| ui::indented(&line)).await?;

        let status = child
            .wait()
            .await
            .map_err(|e| SupplyError::command_failed(spec.to_string(), e))?;

        if status.success() {
            Ok(())
        } else {
            Err(SupplyError::CommandStatus {
                command: spec.to_string(),
                code: status.code().unwrap_or(-1),
            })
        }
    }

    async fn output(&self, spec: &CommandSpec) -> SupplyResult<String> {
        debug!("Capturing: {} (in {})", spec, spec.dir.display());

        let output = Self::command(spec)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SupplyError::command_failed(spec.to_string(), e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(SupplyError::command_exec(
                spec.to_string(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ))
        }
    }
}

/// One output line, decoded lossily so stray non-UTF-8 bytes never end the drain
fn decode_line(mut raw: Vec<u8>) -> String {
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8_lossy(&raw).into_owned()
}

/// Stream stdout+stderr from a child process, calling `on_line` for each line.
///
/// Both pipes are read until EOF; a child blocked on a full pipe would
/// otherwise never exit.
async fn stream_child_output(
    child: &mut Child,
    on_line: &(dyn Fn(String) + Send + Sync),
) -> SupplyResult<()> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SupplyError::Internal("child stdout was not piped".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SupplyError::Internal("child stderr was not piped".to_string()))?;

    let mut stdout_reader = BufReader::new(stdout).split(b'\n');
    let mut stderr_reader = BufReader::new(stderr).split(b'\n');
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stdout_done || !stderr_done {
        tokio::select! {
            segment = stdout_reader.next_segment(), if !stdout_done => match segment {
                Ok(Some(raw)) => on_line(decode_line(raw)),
                Ok(None) => stdout_done = true,
                Err(e) => {
                    debug!("stdout of child closed: {}", e);
                    stdout_done = true;
                }
            },
            segment = stderr_reader.next_segment(), if !stderr_done => match segment {
                Ok(Some(raw)) => on_line(decode_line(raw)),
                Ok(None) => stderr_done = true,
                Err(e) => {
                    debug!("stderr of child closed: {}", e);
                    stderr_done = true;
                }
            },
        }
    }

    Ok(())
}
