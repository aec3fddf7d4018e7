use crate::runner::{StderrSink, TaskRequest, TaskRunner, Terminating};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use swipe_core::{Error, Result, STDOUT_CAPTURE_FILENAME};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Runs the task command with `sh -c` in the task's run directory.
///
/// Stdout goes to `stdout.txt`; stderr lines are forwarded as they arrive.
pub struct LocalProcessRunner {
    shell: String,
    cancel_check: Duration,
}

impl LocalProcessRunner {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
            cancel_check: Duration::from_millis(500),
        }
    }
}

impl Default for LocalProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRunner for LocalProcessRunner {
    async fn run(
        &self,
        request: &TaskRequest,
        terminating: &Terminating<'_>,
        stderr: &mut StderrSink<'_>,
    ) -> Result<i32> {
        let stdout_path = request.run_dir.join(STDOUT_CAPTURE_FILENAME);
        let stdout = std::fs::File::create(&stdout_path)
            .map_err(|e| Error::file_system(&stdout_path, "create", e))?;

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&request.command)
            .current_dir(&request.run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::file_system(&request.run_dir, "spawn task command", e))?;

        let child_stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::configuration("task stderr was not captured"))?;
        let mut lines = BufReader::new(child_stderr).lines();
        let mut ticker = tokio::time::interval(self.cancel_check);
        let mut stderr_open = true;

        loop {
            tokio::select! {
                line = lines.next_line(), if stderr_open => {
                    match line.map_err(|e| Error::file_system(&request.run_dir, "read task stderr", e))? {
                        Some(line) => stderr(&line),
                        None => stderr_open = false,
                    }
                }
                status = child.wait(), if !stderr_open => {
                    let status = status
                        .map_err(|e| Error::file_system(&request.run_dir, "wait for task", e))?;
                    return Ok(status.code().unwrap_or(-1));
                }
                _ = ticker.tick() => {
                    if terminating() {
                        let _ = child.kill().await;
                        tracing::warn!(run_id = %request.run_id, "killed local task on request");
                        return Err(Error::cancelled(request.run_id.to_string()));
                    }
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use swipe_core::{Bindings, RunId};
    use crate::runner::RuntimeValues;
    use tempfile::TempDir;

    fn request(dir: &std::path::Path, command: &str) -> TaskRequest {
        TaskRequest {
            run_id: RunId::new(["wf", "call-hello"]),
            run_dir: dir.to_path_buf(),
            command: command.to_string(),
            inputs: Bindings::new(),
            runtime: RuntimeValues::default(),
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let mut lines = Vec::new();
        let code = LocalProcessRunner::new()
            .run(
                &request(temp_dir.path(), "echo out; echo err1 >&2; echo err2 >&2; exit 4"),
                &|| false,
                &mut |line: &str| lines.push(line.to_string()),
            )
            .await?;

        assert_eq!(code, 4);
        assert_eq!(lines, vec!["err1", "err2"]);
        let stdout = std::fs::read_to_string(temp_dir.path().join("stdout.txt")).unwrap();
        assert_eq!(stdout, "out\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_cancellation_kills_the_task() {
        let temp_dir = TempDir::new().unwrap();
        let err = LocalProcessRunner::new()
            .run(&request(temp_dir.path(), "sleep 30"), &|| true, &mut |_: &str| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }
}
