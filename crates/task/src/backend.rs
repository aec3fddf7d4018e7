//! Remote execution on a managed batch-compute service
//!
//! The task's inputs are uploaded as JSON and the job is told where to find
//! them (and where to write its outputs) through its environment. The job is
//! then polled until it finishes, its log stream is tailed into the local
//! stderr callback and `stdout.txt`, and cancellation from the engine is
//! honoured between polls.

use crate::compute::{ComputeApi, JobStatus, SubmitJobRequest};
use crate::runner::{StderrSink, TaskRequest, TaskRunner, Terminating};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use swipe_config::SwipeConfig;
use swipe_core::{
    join_uri, Error, Result, DEFAULT_JOB_CPU, DEFAULT_JOB_MEMORY_MIB, DEFAULT_JOB_RETRIES,
    ENV_INPUT_URI, ENV_OUTPUT_URI, ENV_TASK, STDOUT_CAPTURE_FILENAME,
};
use swipe_store::{ObjectStore, ObjectUri};
use swipe_utils::jittered;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const TERMINATE_REASON: &str = "Job termination requested";

/// Poll-loop view of a submitted job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJob {
    pub id: String,
    pub status: Option<JobStatus>,
    /// Stream the cursor belongs to
    pub log_stream: Option<String>,
    /// Forward token after the last log event read
    pub log_cursor: Option<String>,
    /// Events already forwarded from the page at `log_cursor`
    pub log_seen: usize,
    /// Set once a terminal state has been observed
    pub exit_code: Option<i32>,
}

impl RemoteJob {
    fn new(id: String) -> Self {
        Self {
            id,
            status: None,
            log_stream: None,
            log_cursor: None,
            log_seen: 0,
            exit_code: None,
        }
    }
}

pub struct BatchBackend {
    config: Arc<SwipeConfig>,
    compute: Arc<dyn ComputeApi>,
    store: Arc<dyn ObjectStore>,
    poll_min: Duration,
    poll_max: Duration,
}

impl BatchBackend {
    pub fn new(
        config: Arc<SwipeConfig>,
        compute: Arc<dyn ComputeApi>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            compute,
            store,
            poll_min: Duration::from_secs(1),
            poll_max: Duration::from_secs(2),
        }
    }

    /// Override the poll interval bounds
    pub fn with_poll_interval(mut self, min: Duration, max: Duration) -> Self {
        self.poll_min = min;
        self.poll_max = max;
        self
    }

    /// Input and output document locations for a step
    pub fn io_uris(prefix: &str, task_name: &str, step: &str) -> (String, String) {
        (
            join_uri(prefix, &format!("{task_name}/{step}-input.json")),
            join_uri(prefix, &format!("{task_name}/{step}-output.json")),
        )
    }

    /// Submit the task, poll it to completion and return its exit code.
    ///
    /// The exit code is the one the service reports, or `-1` for a failed
    /// job without one, or `1` otherwise.
    pub async fn run(
        &self,
        request: &TaskRequest,
        terminating: &Terminating<'_>,
        stderr: &mut StderrSink<'_>,
    ) -> Result<i32> {
        let task_name = request.run_id.task_name().ok_or_else(|| {
            Error::configuration(format!("cannot parse a task name from run id '{}'", request.run_id))
        })?;
        let step = request.run_id.last().unwrap_or_default();
        let queue = self.config.batch.queue_for(&task_name).ok_or_else(|| {
            Error::configuration(format!("no batch queue configured for task '{task_name}'"))
        })?;
        let job_definition = self.config.batch.job_definition.as_deref().ok_or_else(|| {
            Error::configuration("remote execution requires a batch job definition")
        })?;
        let prefix = self.config.upload.get_prefix().ok_or_else(|| {
            Error::configuration("remote execution requires an upload prefix")
        })?;

        let (input_uri, output_uri) = Self::io_uris(prefix, &task_name, step);
        let inputs_json = request.inputs.to_json(None).to_string();
        self.store
            .put(&ObjectUri::parse(&input_uri)?, Bytes::from(inputs_json))
            .await?;

        let stdout_path = request.run_dir.join(STDOUT_CAPTURE_FILENAME);
        tokio::fs::File::create(&stdout_path)
            .await
            .map_err(|e| Error::file_system(&stdout_path, "create", e))?;

        let mut environment: Vec<(String, String)> = self
            .config
            .batch
            .passthrough_env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        environment.push((ENV_INPUT_URI.to_string(), input_uri));
        environment.push((ENV_OUTPUT_URI.to_string(), output_uri));
        environment.push((ENV_TASK.to_string(), task_name.clone()));

        let submit = SubmitJobRequest {
            job_name: Uuid::new_v4().to_string(),
            job_queue: queue.to_string(),
            job_definition: job_definition.to_string(),
            environment,
            memory_mib: request.runtime.memory_mib.unwrap_or(DEFAULT_JOB_MEMORY_MIB),
            vcpus: request.runtime.cpu.unwrap_or(DEFAULT_JOB_CPU),
            retry_attempts: request.runtime.max_retries.unwrap_or(DEFAULT_JOB_RETRIES),
        };
        let job_id = self.compute.submit_job(submit).await?;
        tracing::info!(job_id = %job_id, task = %task_name, queue, "submitted batch job");

        self.poll(RemoteJob::new(job_id), &stdout_path, terminating, stderr)
            .await
    }

    async fn poll(
        &self,
        mut job: RemoteJob,
        stdout_path: &Path,
        terminating: &Terminating<'_>,
        stderr: &mut StderrSink<'_>,
    ) -> Result<i32> {
        let mut last_reason: Option<String> = None;
        let mut done = false;

        loop {
            if terminating() {
                self.compute.terminate_job(&job.id, TERMINATE_REASON).await?;
                job.status = Some(JobStatus::Terminating);
                tracing::warn!(job_id = %job.id, "terminated batch job on request");
                return Err(Error::cancelled(job.id));
            }

            let description = self.compute.describe_job(&job.id).await?;
            let status = description.status;
            if job.status != Some(status) {
                tracing::info!(job_id = %job.id, status = %status, "batch job status");
                if status.has_logs() {
                    tracing::info!(
                        job_id = %job.id,
                        log_stream = ?description.log_stream_name,
                        "batch job log stream"
                    );
                }
                job.status = Some(status);
            }

            if status.has_logs() {
                if let Some(stream) = description.log_stream_name.as_deref() {
                    let group = description
                        .log_group_name
                        .as_deref()
                        .unwrap_or(&self.config.batch.default_log_group);
                    self.tail_logs(&mut job, group, stream, stdout_path, stderr)
                        .await?;
                }
            }

            if let Some(reason) = description.status_reason {
                if last_reason.as_deref() != Some(reason.as_str()) {
                    tracing::info!(job_id = %job.id, reason = %reason, "batch job status reason");
                    last_reason = Some(reason);
                }
            }

            // one extra cycle after the terminal state picks up late log lines
            if done {
                let exit_code = match (description.exit_code, status) {
                    (Some(code), _) => code,
                    (None, JobStatus::Failed) => -1,
                    (None, _) => 1,
                };
                job.exit_code = Some(exit_code);
                tracing::info!(job_id = %job.id, exit_code, "batch job finished");
                return Ok(exit_code);
            }
            if status.is_terminal() {
                done = true;
            }

            tokio::time::sleep(jittered(self.poll_min, self.poll_max)).await;
        }
    }

    async fn tail_logs(
        &self,
        job: &mut RemoteJob,
        group: &str,
        stream: &str,
        stdout_path: &Path,
        stderr: &mut StderrSink<'_>,
    ) -> Result<()> {
        if job.log_stream.as_deref() != Some(stream) {
            job.log_stream = Some(stream.to_string());
            job.log_cursor = None;
            job.log_seen = 0;
        }

        let mut capture = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(stdout_path)
            .await
            .map_err(|e| Error::file_system(stdout_path, "open for append", e))?;

        loop {
            let page = self
                .compute
                .get_log_events(group, stream, job.log_cursor.clone())
                .await?;
            for line in page.events.iter().skip(job.log_seen) {
                stderr(line.as_str());
                capture
                    .write_all(format!("{line}\n").as_bytes())
                    .await
                    .map_err(|e| Error::file_system(stdout_path, "append", e))?;
            }

            // Without a fresh token the page is re-read from the same cursor
            // on the next poll, so remember how much of it was forwarded.
            match page.next_forward_token {
                Some(token) if job.log_cursor.as_deref() != Some(token.as_str()) => {
                    job.log_cursor = Some(token);
                    job.log_seen = 0;
                    if page.events.is_empty() {
                        break;
                    }
                }
                _ => {
                    job.log_seen = job.log_seen.max(page.events.len());
                    break;
                }
            }
        }

        capture
            .flush()
            .await
            .map_err(|e| Error::file_system(stdout_path, "flush", e))
    }
}

#[async_trait]
impl TaskRunner for BatchBackend {
    async fn run(
        &self,
        request: &TaskRequest,
        terminating: &Terminating<'_>,
        stderr: &mut StderrSink<'_>,
    ) -> Result<i32> {
        BatchBackend::run(self, request, terminating, stderr).await
    }
}
