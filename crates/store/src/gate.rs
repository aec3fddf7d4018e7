//! Serialized access to the remote copy tool
//!
//! Bursts of small uploads from one task can trip the object store's request
//! rate limit, so every transfer runs under one async lock. Holding a
//! [`CopyPermit`] also lets a caller check what was already uploaded and copy
//! in one critical section.

use crate::object_store::{ObjectStore, Tag};
use crate::transfer::TransferTool;
use crate::uri::ObjectUri;
use std::path::Path;
use std::sync::Arc;
use swipe_core::{Error, Result, INTERMEDIATE_TAG_KEY, INTERMEDIATE_TAG_VALUE};
use swipe_utils::{retry_async, RetryConfig};
use tokio::sync::{Mutex, MutexGuard};

pub struct RemoteCopyGate {
    transfer: Arc<dyn TransferTool>,
    store: Arc<dyn ObjectStore>,
    lock: Mutex<()>,
    tag_retry: RetryConfig,
}

/// Exclusive right to run the transfer tool, released on drop
pub struct CopyPermit<'a> {
    gate: &'a RemoteCopyGate,
    _guard: MutexGuard<'a, ()>,
}

impl RemoteCopyGate {
    pub fn new(transfer: Arc<dyn TransferTool>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            transfer,
            store,
            lock: Mutex::new(()),
            tag_retry: RetryConfig::tag_update(),
        }
    }

    /// Override the retry schedule used when removing temporary tags
    pub fn with_tag_retry(mut self, tag_retry: RetryConfig) -> Self {
        self.tag_retry = tag_retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Wait for exclusive use of the transfer tool
    pub async fn acquire(&self) -> CopyPermit<'_> {
        CopyPermit {
            gate: self,
            _guard: self.lock.lock().await,
        }
    }

    /// Copy one file, waiting for the gate first
    pub async fn copy(&self, local: &Path, uri: &str, flag_temporary: bool) -> Result<()> {
        self.acquire().await.copy(local, uri, flag_temporary).await
    }

    /// Tag an object `intermediate_output=true`.
    ///
    /// Failures are logged and dropped: an untagged object is only kept
    /// longer by lifecycle rules.
    pub async fn flag_temporary(&self, uri: &str) {
        let result = match ObjectUri::parse(uri) {
            Ok(target) => {
                self.store
                    .put_tags(
                        &target,
                        vec![Tag::new(INTERMEDIATE_TAG_KEY, INTERMEDIATE_TAG_VALUE)],
                    )
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(uri, error = %e, "could not flag object as intermediate output");
        }
    }

    /// Drop the `intermediate_output=true` tag, keeping any other tags.
    ///
    /// A missing object is a no-op. Other store errors are retried on the
    /// tag-update schedule and returned once it is exhausted.
    pub async fn remove_temporary_flag(&self, uri: &str) -> Result<()> {
        let target = ObjectUri::parse(uri)?;
        match retry_async(&self.tag_retry, || self.strip_temporary_tag(&target)).await {
            Err(e) if e.is_not_found() => {
                tracing::debug!(uri, "object not found, no temporary flag to remove");
                Ok(())
            }
            other => other,
        }
    }

    async fn strip_temporary_tag(&self, target: &ObjectUri) -> Result<()> {
        let tags = self.store.get_tags(target).await?;
        let remaining: Vec<Tag> = tags
            .iter()
            .filter(|tag| !(tag.key == INTERMEDIATE_TAG_KEY && tag.value == INTERMEDIATE_TAG_VALUE))
            .cloned()
            .collect();

        if remaining.len() == tags.len() {
            return Ok(());
        }
        if remaining.is_empty() {
            self.store.delete_tags(target).await
        } else {
            self.store.put_tags(target, remaining).await
        }
    }
}

impl CopyPermit<'_> {
    /// Run the transfer tool for one file.
    ///
    /// A non-zero exit is logged with the tool's stderr and returned as
    /// `Error::Transfer`.
    pub async fn copy(&self, local: &Path, uri: &str, flag_temporary: bool) -> Result<()> {
        let outcome = self.gate.transfer.transfer(local, uri).await?;
        if !outcome.is_success() {
            tracing::error!(
                file = %local.display(),
                uri,
                exit_status = ?outcome.exit_code,
                stderr = %outcome.stderr.trim_end(),
                "failed uploading output file"
            );
            return Err(Error::transfer(
                local,
                uri,
                outcome.exit_code,
                outcome.stderr,
            ));
        }

        if flag_temporary {
            self.gate.flag_temporary(uri).await;
        }
        Ok(())
    }
}
