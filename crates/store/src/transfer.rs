use crate::object_store::ObjectStore;
use crate::uri::ObjectUri;
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use swipe_core::{Error, Result};
use tokio::process::Command;

/// Result of one transfer tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// `None` when the tool was killed by a signal
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl TransferOutcome {
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Copies one local file to a remote URI
///
/// A non-zero exit is reported through [`TransferOutcome`], not as an
/// error; `Err` means the tool could not be run at all.
#[async_trait]
pub trait TransferTool: Send + Sync {
    async fn transfer(&self, local: &Path, uri: &str) -> Result<TransferOutcome>;
}

/// Runs an external copy program: `<program> --checksum --max-retries <n> <file> <uri>`
pub struct CommandTransferTool {
    program: String,
    max_retries: u32,
}

impl CommandTransferTool {
    pub fn new(program: impl Into<String>, max_retries: u32) -> Self {
        Self {
            program: program.into(),
            max_retries,
        }
    }

    pub fn args(&self, local: &Path, uri: &str) -> Vec<String> {
        vec![
            "--checksum".to_string(),
            "--max-retries".to_string(),
            self.max_retries.to_string(),
            local.display().to_string(),
            uri.to_string(),
        ]
    }
}

impl Default for CommandTransferTool {
    fn default() -> Self {
        Self::new("s3parcp", 10)
    }
}

#[async_trait]
impl TransferTool for CommandTransferTool {
    async fn transfer(&self, local: &Path, uri: &str) -> Result<TransferOutcome> {
        let args = self.args(local, uri);
        tracing::debug!(program = %self.program, args = ?args, "running transfer tool");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::file_system(&self.program, "spawn transfer tool", e))?;

        Ok(TransferOutcome {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Uploads through an [`ObjectStore`] and checks the stored bytes' SHA-256
/// against the local file
pub struct StoreTransferTool {
    store: Arc<dyn ObjectStore>,
}

impl StoreTransferTool {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TransferTool for StoreTransferTool {
    async fn transfer(&self, local: &Path, uri: &str) -> Result<TransferOutcome> {
        let target = match ObjectUri::parse(uri) {
            Ok(target) => target,
            Err(e) => return Ok(TransferOutcome::failure(2, e.to_string())),
        };
        let body = tokio::fs::read(local)
            .await
            .map_err(|e| Error::file_system(local, "read", e))?;
        let expected = hex::encode(Sha256::digest(&body));

        if let Err(e) = self.store.put(&target, Bytes::from(body)).await {
            return Ok(TransferOutcome::failure(1, e.to_string()));
        }

        let stored = match self.store.get(&target).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return Ok(TransferOutcome::failure(1, "object missing after upload")),
            Err(e) => return Ok(TransferOutcome::failure(1, e.to_string())),
        };
        let actual = hex::encode(Sha256::digest(&stored));
        if actual != expected {
            return Ok(TransferOutcome::failure(
                1,
                format!("checksum mismatch: local {expected}, remote {actual}"),
            ));
        }

        Ok(TransferOutcome::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryObjectStore, StoreOp};
    use swipe_core::StoreErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_command_args() {
        let tool = CommandTransferTool::default();
        assert_eq!(
            tool.args(Path::new("/w/out/x/a.txt"), "s3://b/a.txt"),
            vec!["--checksum", "--max-retries", "10", "/w/out/x/a.txt", "s3://b/a.txt"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_failure_captures_stderr() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("fake-copy");
        std::fs::write(&script, "#!/bin/sh\necho \"denied: $5\" >&2\nexit 3\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let tool = CommandTransferTool::new(script.display().to_string(), 10);
        let outcome = tool
            .transfer(Path::new("/tmp/a.txt"), "s3://bucket/a.txt")
            .await?;

        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr.trim(), "denied: s3://bucket/a.txt");
        Ok(())
    }

    #[tokio::test]
    async fn test_store_transfer_round_trip() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("reads.fq");
        std::fs::write(&local, "@r1\nACGT\n+\n!!!!\n").unwrap();

        let store = Arc::new(MemoryObjectStore::new());
        let tool = StoreTransferTool::new(store.clone());
        let outcome = tool.transfer(&local, "s3://bucket/run/reads.fq").await?;

        assert!(outcome.is_success());
        assert_eq!(
            store.object("s3://bucket/run/reads.fq").unwrap(),
            Bytes::from_static(b"@r1\nACGT\n+\n!!!!\n")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_store_transfer_reports_put_failure() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("a.txt");
        std::fs::write(&local, "a").unwrap();

        let store = Arc::new(MemoryObjectStore::new());
        store.fail_next(StoreOp::Put, StoreErrorKind::Transport, 1);
        let outcome = StoreTransferTool::new(store)
            .transfer(&local, "s3://bucket/a.txt")
            .await?;

        assert_eq!(outcome.exit_code, Some(1));
        assert!(outcome.stderr.contains("injected failure"));
        Ok(())
    }
}
