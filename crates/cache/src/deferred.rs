//! Call cache whose entries live next to the uploaded outputs
//!
//! `get` pulls the remote entry for a key into the local cache directory
//! and delegates to [`LocalCallCache`]. `put` records a pending entry and
//! commits it as soon as every output it names has an uploaded URI; the
//! upload pipeline calls [`DeferredCommitCache::commit_waiting`] whenever it
//! publishes an identity, so whichever of the two happens last writes the
//! entry.
//!
//! Cache problems never fail a task: `get` degrades to a miss and `put` to
//! a no-op, both with a warning.

use crate::call_cache::{CallCache, OutputTypes};
use crate::hashing::{digest_bindings, durable_key};
use crate::ledger::{PendingCacheEntry, UploadLedger};
use crate::local::LocalCallCache;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use swipe_config::SwipeConfig;
use swipe_core::{join_uri, Bindings, Error, FileIdentity, Result, CACHE_URI_SEGMENT};
use swipe_store::{ObjectUri, RemoteCopyGate};
use swipe_utils::atomic_file::write_atomic;

pub struct DeferredCommitCache {
    config: Arc<SwipeConfig>,
    ledger: Arc<UploadLedger>,
    gate: Arc<RemoteCopyGate>,
    local: LocalCallCache,
}

impl DeferredCommitCache {
    pub fn new(
        config: Arc<SwipeConfig>,
        ledger: Arc<UploadLedger>,
        gate: Arc<RemoteCopyGate>,
    ) -> Self {
        let local = LocalCallCache::new(config.call_cache.dir.clone());
        Self {
            config,
            ledger,
            gate,
            local,
        }
    }

    /// Remote location of the entry for a key under `prefix`
    pub fn entry_uri(prefix: &str, key: &str) -> String {
        join_uri(prefix, &format!("{CACHE_URI_SEGMENT}/{key}.json"))
    }

    /// Try to make the pending entry for `key` durable.
    ///
    /// Returns `Ok(false)` when there is nothing to write yet: no pending
    /// entry, an output not uploaded, or another caller already claimed it.
    pub async fn try_commit(&self, key: &str) -> Result<bool> {
        let Some(prefix) = self.config.upload.put_prefix() else {
            return Ok(false);
        };
        let Some(plan) = self.ledger.claim(key) else {
            return Ok(false);
        };

        let durable = durable_key(&plan.key, &digest_bindings(&plan.remote_inputs));
        let uri = Self::entry_uri(prefix, &durable);
        let body = plan.remote_outputs.to_json(None).to_string();

        self.gate
            .store()
            .put(&ObjectUri::parse(&uri)?, Bytes::from(body))
            .await?;
        self.gate.flag_temporary(&uri).await;

        tracing::info!(key, cache_file = %uri, "call cache insert");
        Ok(true)
    }

    /// Re-evaluate entries that were waiting on a newly published identity
    pub async fn commit_waiting(&self, keys: Vec<String>) {
        for key in keys {
            if let Err(e) = self.try_commit(&key).await {
                tracing::warn!(key = %key, error = %e, "call cache commit failed; entry dropped");
            }
        }
    }

    async fn fetch_remote_entry(&self, prefix: &str, key: &str) -> Result<()> {
        let uri = Self::entry_uri(prefix, key);
        let Some(body) = self.gate.store().get(&ObjectUri::parse(&uri)?).await? else {
            tracing::debug!(key, uri = %uri, "no remote call cache entry");
            return Ok(());
        };
        write_atomic(&self.local.entry_path(key), &body)?;
        tracing::debug!(key, uri = %uri, "downloaded call cache entry");
        Ok(())
    }

    fn pending_entry(&self, key: &str, outputs: &Bindings, inputs: Bindings) -> Result<PendingCacheEntry> {
        let mut output_ids = HashMap::new();
        for (_, path) in outputs.paths() {
            let id = FileIdentity::resolve(path)
                .map_err(|e| Error::cache(key, format!("output '{path}': {e}")))?;
            output_ids.insert(path.to_string(), id);
        }

        // inputs that cannot be resolved keep their local value in the digest
        let input_ids = inputs
            .paths()
            .into_iter()
            .filter_map(|(_, path)| {
                FileIdentity::resolve(path)
                    .ok()
                    .map(|id| (path.to_string(), id))
            })
            .collect();

        Ok(PendingCacheEntry {
            key: key.to_string(),
            outputs: outputs.clone(),
            output_ids,
            inputs,
            input_ids,
        })
    }
}

#[async_trait]
impl CallCache for DeferredCommitCache {
    async fn get(
        &self,
        key: &str,
        inputs: &Bindings,
        output_types: &OutputTypes,
    ) -> Result<Option<Bindings>> {
        self.ledger.record_inputs(key, inputs.clone());

        if !self.config.call_cache.get {
            return Ok(None);
        }

        // A get prefix alone does not enable the remote cache
        let remote = self
            .config
            .upload
            .put_prefix()
            .and_then(|_| self.config.upload.get_prefix());
        if let Some(prefix) = remote {
            if let Err(e) = self.fetch_remote_entry(prefix, key).await {
                tracing::warn!(key, error = %e, "call cache unavailable, running without it");
                return Ok(None);
            }
        }

        match self.local.get(key, inputs, output_types).await {
            Ok(hit) => Ok(hit),
            Err(e) => {
                tracing::warn!(key, error = %e, "call cache lookup failed, treating as miss");
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, outputs: &Bindings) -> Result<()> {
        if !self.config.call_cache.put {
            return Ok(());
        }

        if self.config.upload.put_prefix().is_none() {
            if let Err(e) = self.local.put(key, outputs).await {
                tracing::warn!(key, error = %e, "skipping call cache insert");
            }
            return Ok(());
        }

        let Some(inputs) = self.ledger.inputs_for(key) else {
            tracing::warn!(key, "call cache put without a preceding get; skipping");
            return Ok(());
        };

        match self.pending_entry(key, outputs, inputs) {
            Ok(entry) => self.ledger.record_pending(entry),
            Err(e) => {
                tracing::warn!(key, error = %e, "skipping call cache insert");
                return Ok(());
            }
        }

        if let Err(e) = self.try_commit(key).await {
            tracing::warn!(key, error = %e, "call cache commit failed; entry dropped");
        }
        Ok(())
    }
}
