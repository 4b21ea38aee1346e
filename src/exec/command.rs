// src/exec/command.rs

//! Shell command runner shared by the built-in command checker and worker.

use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    /// Last non-empty stdout line, if any.
    pub last_line: Option<String>,
}

/// Run `cmd` through the platform shell with extra environment variables.
///
/// The child is killed if the returned future is dropped, so a supervisor
/// that gets cancelled mid-run never leaks a process.
pub async fn run_shell(cmd: &str, envs: &[(&str, String)]) -> Result<CommandOutput> {
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    for (key, value) in envs {
        command.env(key, value);
    }
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning '{cmd}'"))?;

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let cmd = cmd.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(cmd = %cmd, "stderr: {}", line);
            }
        });
    }

    let mut last_line = None;
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .with_context(|| format!("reading stdout of '{cmd}'"))?
        {
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for '{cmd}'"))?;
    Ok(CommandOutput { status, last_line })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exit_status_and_last_line_are_reported() {
        let out = run_shell("echo one; echo \"$GREETING\"; exit 3", &[("GREETING", "hi".into())])
            .await
            .unwrap();
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(out.last_line.as_deref(), Some("hi"));
    }
}
