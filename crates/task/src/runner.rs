use crate::backend::BatchBackend;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use swipe_config::SwipeConfig;
use swipe_core::{Bindings, Result, RunId};

/// Polled by runners; returns true once the engine wants the task stopped
pub type Terminating<'a> = dyn Fn() -> bool + Send + Sync + 'a;

/// Receives every line the task writes to stderr
pub type StderrSink<'a> = dyn FnMut(&str) + Send + 'a;

/// Resource requests from the task's runtime section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeValues {
    pub memory_mib: Option<i64>,
    pub cpu: Option<i64>,
    pub max_retries: Option<i64>,
}

/// One task invocation handed to a runner
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub run_id: RunId,
    /// Working directory; `stdout.txt` is written here
    pub run_dir: PathBuf,
    pub command: String,
    pub inputs: Bindings,
    pub runtime: RuntimeValues,
}

/// Executes a task command to completion and reports its exit code
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(
        &self,
        request: &TaskRequest,
        terminating: &Terminating<'_>,
        stderr: &mut StderrSink<'_>,
    ) -> Result<i32>;
}

/// Routes tasks named in the batch queue table to the remote backend and
/// everything else to a local runner
pub struct HybridRunner {
    config: Arc<SwipeConfig>,
    local: Arc<dyn TaskRunner>,
    batch: Arc<BatchBackend>,
}

impl HybridRunner {
    pub fn new(config: Arc<SwipeConfig>, local: Arc<dyn TaskRunner>, batch: Arc<BatchBackend>) -> Self {
        Self { config, local, batch }
    }

    pub fn is_remote(&self, run_id: &RunId) -> bool {
        run_id
            .task_name()
            .is_some_and(|name| self.config.batch.queue_for(&name).is_some())
    }
}

#[async_trait]
impl TaskRunner for HybridRunner {
    async fn run(
        &self,
        request: &TaskRequest,
        terminating: &Terminating<'_>,
        stderr: &mut StderrSink<'_>,
    ) -> Result<i32> {
        if self.is_remote(&request.run_id) {
            self.batch.run(request, terminating, stderr).await
        } else {
            self.local.run(request, terminating, stderr).await
        }
    }
}
