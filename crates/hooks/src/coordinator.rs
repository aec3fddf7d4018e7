use crate::manifest::OutputManifest;
use crate::protocol::HookChain;
use crate::status::{StatusHook, StatusRecorder};
use crate::upload::ProgressiveUpload;
use std::sync::Arc;
use swipe_cache::{DeferredCommitCache, UploadLedger};
use swipe_config::SwipeConfig;
use swipe_core::Result;
use swipe_store::{ObjectStore, RemoteCopyGate, TransferTool};
use swipe_task::{BatchBackend, ComputeApi, HybridRunner, LocalProcessRunner, TaskRunner};

/// Owner of every table and collaborator shared between tasks.
///
/// One coordinator lives for the whole process; the hooks, the call cache
/// and the task runner it hands out all share its ledger and copy gate.
pub struct Coordinator {
    config: Arc<SwipeConfig>,
    ledger: Arc<UploadLedger>,
    gate: Arc<RemoteCopyGate>,
    cache: Arc<DeferredCommitCache>,
    recorder: Arc<StatusRecorder>,
    backend: Arc<BatchBackend>,
}

impl Coordinator {
    pub fn new(
        config: SwipeConfig,
        store: Arc<dyn ObjectStore>,
        transfer: Arc<dyn TransferTool>,
        compute: Arc<dyn ComputeApi>,
    ) -> Result<Self> {
        config.validate()?;
        let gate = Arc::new(RemoteCopyGate::new(transfer, store.clone()));
        Ok(Self::with_gate(config, gate, compute))
    }

    /// Build around an existing copy gate, e.g. one with a custom tag retry
    pub fn with_gate(config: SwipeConfig, gate: Arc<RemoteCopyGate>, compute: Arc<dyn ComputeApi>) -> Self {
        let config = Arc::new(config);
        let store = gate.store().clone();
        let ledger = Arc::new(UploadLedger::new());
        let cache = Arc::new(DeferredCommitCache::new(
            config.clone(),
            ledger.clone(),
            gate.clone(),
        ));
        let recorder = Arc::new(StatusRecorder::new(config.clone(), store.clone()));
        let backend = Arc::new(BatchBackend::new(config.clone(), compute, store));

        tracing::debug!(
            upload_prefix = ?config.upload.put_prefix(),
            cache_get = config.call_cache.get,
            cache_put = config.call_cache.put,
            remote_tasks = config.batch.queues.len(),
            status = config.status.enabled,
            "coordinator ready"
        );
        Self {
            config,
            ledger,
            gate,
            cache,
            recorder,
            backend,
        }
    }

    pub fn config(&self) -> &Arc<SwipeConfig> {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<UploadLedger> {
        &self.ledger
    }

    pub fn call_cache(&self) -> Arc<DeferredCommitCache> {
        self.cache.clone()
    }

    pub fn status_recorder(&self) -> &Arc<StatusRecorder> {
        &self.recorder
    }

    /// Hooks in nesting order: status outermost, so a failed upload is
    /// recorded as a failed step.
    pub fn hooks(&self) -> HookChain {
        HookChain::new()
            .with_task_hook(Arc::new(StatusHook::new(self.recorder.clone())))
            .with_task_hook(Arc::new(ProgressiveUpload::new(
                self.config.clone(),
                self.ledger.clone(),
                self.gate.clone(),
                self.cache.clone(),
            )))
            .with_workflow_hook(Arc::new(OutputManifest::new(
                self.config.clone(),
                self.ledger.clone(),
                self.gate.clone(),
            )))
    }

    /// Runner sending routed tasks to the batch backend and the rest to `local`
    pub fn runner_with(&self, local: Arc<dyn TaskRunner>) -> HybridRunner {
        HybridRunner::new(self.config.clone(), local, self.backend.clone())
    }

    pub fn runner(&self) -> HybridRunner {
        self.runner_with(Arc::new(LocalProcessRunner::new()))
    }

    /// Install the process-wide log subscriber unless the embedding engine
    /// already has one. Returns whether this call installed it.
    pub fn init_logging() -> bool {
        match swipe_utils::tracing::init() {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "keeping the existing log subscriber");
                false
            }
        }
    }
}

#[cfg(feature = "aws")]
impl Coordinator {
    /// Configuration from the environment, S3, the configured copy program
    /// and AWS Batch
    pub async fn from_env() -> Result<Self> {
        Self::init_logging();
        let config = swipe_config::ConfigLoader::from_env().load()?;
        let store = Arc::new(swipe_store::s3::S3ObjectStore::from_env().await);
        let transfer = Arc::new(swipe_store::CommandTransferTool::new(
            config.transfer.program.clone(),
            config.transfer.max_retries,
        ));
        let compute = Arc::new(swipe_task::BatchComputeApi::from_env().await);
        Self::new(config, store, transfer, compute)
    }
}
