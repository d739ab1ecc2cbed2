//! Code-execution collaborator.
//!
//! [`execute`] writes source text to a temporary script, runs it with the
//! configured interpreter under a wall-clock timeout and returns both
//! output streams. It never fails: spawn errors and timeouts are reported
//! through `stderr`. The script file is deleted when the call returns,
//! whichever way it returns.
//!
//! This is process-level isolation only. The script runs with the
//! caller's permissions.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::SandboxConfig;

/// Captured output of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutput {
    fn error(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
        }
    }

    pub fn failed(&self) -> bool {
        !self.stderr.trim().is_empty()
    }
}

/// Run `source` with `config.interpreter`, killing it after `config.timeout_secs`.
pub async fn execute(source: &str, config: &SandboxConfig) -> ExecutionOutput {
    let mut script = match tempfile::Builder::new()
        .prefix("pctx-")
        .suffix(".py")
        .tempfile()
    {
        Ok(f) => f,
        Err(e) => return ExecutionOutput::error(format!("Subprocess error: {}", e)),
    };
    if let Err(e) = write_script(script.as_file_mut(), source) {
        return ExecutionOutput::error(format!("Subprocess error: {}", e));
    }

    debug!(
        "running {} {}",
        config.interpreter,
        script.path().display()
    );
    let child = Command::new(&config.interpreter)
        .arg(script.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(c) => c,
        Err(e) => {
            warn!("failed to spawn {}: {}", config.interpreter, e);
            return ExecutionOutput::error(format!("Subprocess error: {}", e));
        }
    };

    let limit = Duration::from_secs(config.timeout_secs);
    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => ExecutionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        },
        Ok(Err(e)) => ExecutionOutput::error(format!("Subprocess error: {}", e)),
        Err(_) => {
            warn!("script exceeded {}s, killed", config.timeout_secs);
            ExecutionOutput::error(format!(
                "Execution Error: Code execution exceeded the {}-second timeout limit.",
                config.timeout_secs
            ))
        }
    };

    drop(script);
    output
}

fn write_script(file: &mut std::fs::File, source: &str) -> std::io::Result<()> {
    file.write_all(source.as_bytes())?;
    file.flush()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;

    fn shell(timeout_secs: u64) -> SandboxConfig {
        SandboxConfig {
            interpreter: "sh".into(),
            timeout_secs,
        }
    }

    #[tokio::test]
    async fn captures_both_streams() {
        let out = execute("echo out; echo err >&2", &shell(5)).await;
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert!(out.failed());
    }

    #[tokio::test]
    async fn script_file_is_removed() {
        let out = execute("echo \"$0\"", &shell(5)).await;
        let path = out.stdout.trim();
        assert!(path.ends_with(".py"));
        assert!(!Path::new(path).exists());
    }

    #[tokio::test]
    async fn timeout_is_reported_on_stderr() {
        let out = execute("sleep 5", &shell(1)).await;
        assert_eq!(
            out.stderr,
            "Execution Error: Code execution exceeded the 1-second timeout limit."
        );
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn missing_interpreter_is_reported() {
        let config = SandboxConfig {
            interpreter: "pctx-no-such-interpreter".into(),
            timeout_secs: 5,
        };
        let out = execute("print(1)", &config).await;
        assert!(out.stderr.starts_with("Subprocess error:"));
    }
}
