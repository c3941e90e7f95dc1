// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local step execution: runs a step's `command` as a child process,
//! captures stdout/stderr, and parses a declared output variable from the
//! final `NAME=value` stdout line (§4.7 step 2).

use std::process::Stdio;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("io error spawning command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("command exited with non-zero status {0}")]
    NonZeroExit(i32),

    #[error("command was cancelled")]
    Cancelled,

    #[error("child process did not expose a piped {0} handle")]
    MissingPipe(&'static str),
}

pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub output_value: Option<String>,
}

/// Run `command` under `/bin/sh -c`, streaming each line to `on_line` as
/// it's produced so the caller can forward it to the log stream (§4.8).
/// Cooperative cancellation: on `cancel`, the child is sent SIGTERM then,
/// after `shutdown_grace`, SIGKILL (§4.7 Cancellation).
pub async fn run_step(
    command: &str,
    output_var: Option<&str>,
    cancel: CancellationToken,
    shutdown_grace: std::time::Duration,
    mut on_stdout_line: impl FnMut(&str),
    mut on_stderr_line: impl FnMut(&str),
) -> Result<ExecOutcome, ExecError> {
    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let Some(stdout) = child.stdout.take() else {
        return Err(ExecError::MissingPipe("stdout"));
    };
    let Some(stderr) = child.stderr.take() else {
        return Err(ExecError::MissingPipe("stderr"));
    };
    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut last_stdout_line = String::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                terminate_cooperatively(&mut child, shutdown_grace).await;
                return Err(ExecError::Cancelled);
            }
            line = stdout_lines.next_line() => {
                match line? {
                    Some(line) => {
                        on_stdout_line(&line);
                        stdout.push_str(&line);
                        stdout.push('\n');
                        last_stdout_line = line;
                    }
                    None => break,
                }
            }
            line = stderr_lines.next_line() => {
                if let Some(line) = line? {
                    on_stderr_line(&line);
                    stderr.push_str(&line);
                    stderr.push('\n');
                }
            }
        }
    }

    // Drain any remaining stderr after stdout closes.
    while let Some(line) = stderr_lines.next_line().await? {
        on_stderr_line(&line);
        stderr.push_str(&line);
        stderr.push('\n');
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            terminate_cooperatively(&mut child, shutdown_grace).await;
            return Err(ExecError::Cancelled);
        }
        status = child.wait() => status?,
    };

    if !status.success() {
        return Err(ExecError::NonZeroExit(status.code().unwrap_or(-1)));
    }

    let output_value = output_var.and_then(|name| parse_output_line(&last_stdout_line, name));

    Ok(ExecOutcome { stdout, stderr, output_value })
}

/// Parse a `NAME=value` line, matching only when `NAME` equals the declared
/// output variable name.
fn parse_output_line(line: &str, name: &str) -> Option<String> {
    let (key, value) = line.split_once('=')?;
    if key.trim() == name {
        Some(value.trim().to_string())
    } else {
        None
    }
}

/// Send SIGTERM and give the child `grace` to exit on its own, then SIGKILL
/// (§4.7 Cancellation: "local commands receive SIGTERM then SIGKILL after
/// the grace").
async fn terminate_cooperatively(child: &mut tokio::process::Child, grace: std::time::Duration) {
    if let Some(pid) = child.id() {
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_captures_stdout_and_output_var() {
        let cancel = CancellationToken::new();
        let outcome = run_step(
            "echo start; echo RESULT=42",
            Some("RESULT"),
            cancel,
            std::time::Duration::from_secs(5),
            |_| {},
            |_| {},
        )
        .await
        .expect("command succeeds");
        assert_eq!(outcome.output_value, Some("42".to_string()));
        assert!(outcome.stdout.contains("start"));
    }

    #[tokio::test]
    async fn non_zero_exit_surfaces_as_node_failed() {
        let cancel = CancellationToken::new();
        let err = run_step("exit 3", None, cancel, std::time::Duration::from_secs(5), |_| {}, |_| {})
            .await
            .expect_err("should fail");
        assert!(matches!(err, ExecError::NonZeroExit(3)));
    }

    #[tokio::test]
    async fn cancellation_stops_the_command() {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });
        let err = run_step(
            "sleep 5",
            None,
            cancel,
            std::time::Duration::from_millis(50),
            |_| {},
            |_| {},
        )
        .await
        .expect_err("should be cancelled");
        assert!(matches!(err, ExecError::Cancelled));
    }
}
