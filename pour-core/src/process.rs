// pour-core/src/process.rs
use std::process::Stdio;

use async_trait::async_trait;
use pour_common::capability::{CommandOutput, ProcessRunner};
use pour_common::error::{PourError, Result};
use tokio::process::Command;
use tracing::{debug, error};

/// Runs commands with tokio. Children are killed if the future is dropped,
/// so wrapping `run` in a timeout never leaks a process.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("Running command: {} {:?}", command, args);

        let mut cmd = Command::new(command);
        cmd.args(args);
        cmd.kill_on_drop(true);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null()); // Prevent hanging on stdin

        let output = cmd.output().await.map_err(|e| {
            error!("Failed to execute {}: {}", command, e);
            PourError::CommandExec(format!("{command}: {e}"))
        })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if result.success() {
            debug!("Command finished successfully.");
        } else {
            debug!("Command failed with status: {}", output.status);
            if !result.stderr.trim().is_empty() {
                debug!("Stderr:\n{}", result.stderr.trim());
            }
        }
        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let output = TokioProcessRunner
            .run("sh", &["-c".into(), "echo out; echo err >&2; exit 3".into()])
            .await
            .unwrap();
        assert_eq!(output.code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let err = TokioProcessRunner
            .run("/nonexistent/pour-test-binary", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PourError::CommandExec(_)));
    }
}
