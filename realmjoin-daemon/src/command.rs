//! The external command runner boundary.
//!
//! The staged workflow drives external tools only through this trait, so
//! tests can script tool behavior without spawning anything. The system
//! implementation captures combined output and kills the child if the
//! caller cancels mid-stage.

use std::path::Path;
use std::process::Stdio;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::process::Command;

use crate::caller::CallerHandle;

/// Exit status plus captured output of one external invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code; signal deaths map to 128 + signal number.
    pub status: i32,
    /// Combined stdout and stderr, lossily decoded.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs an external executable with an environment overlay.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        argv: &[String],
        env: &[(String, String)],
        caller: &CallerHandle,
    ) -> anyhow::Result<CommandOutput>;
}

/// Runner backed by real subprocesses.
#[derive(Debug, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        argv: &[String],
        env: &[(String, String)],
        caller: &CallerHandle,
    ) -> anyhow::Result<CommandOutput> {
        let program = argv.first().ok_or_else(|| anyhow!("empty command line"))?;
        tracing::debug!(cmd = ?argv, "Running external command");

        let mut cmd = Command::new(program);
        cmd.args(&argv[1..])
            .envs(env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // If the operation is cancelled the wait future is dropped and
            // the child must not outlive it.
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", Path::new(program).display()))?;

        tokio::select! {
            result = child.wait_with_output() => {
                let out = result.with_context(|| format!("failed waiting for {}", program))?;
                let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
                output.push_str(&String::from_utf8_lossy(&out.stderr));

                let status = out
                    .status
                    .code()
                    .unwrap_or_else(|| signal_status(&out.status));

                tracing::debug!(cmd = ?argv, status, "External command finished");
                Ok(CommandOutput { status, output })
            }
            _ = caller.cancelled() => {
                tracing::info!(cmd = ?argv, "External command cancelled");
                Err(anyhow!("command cancelled by caller"))
            }
        }
    }
}

#[cfg(unix)]
fn signal_status(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|sig| 128 + sig).unwrap_or(-1)
}

#[cfg(not(unix))]
fn signal_status(_status: &std::process::ExitStatus) -> i32 {
    -1
}
