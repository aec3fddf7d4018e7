use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use swipe_core::{Error, Result};

/// Lifecycle of a remote job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    Pending,
    Runnable,
    Starting,
    Running,
    Succeeded,
    Failed,
    /// Set locally once termination has been requested
    Terminating,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// States in which the job has (or had) a container writing logs
    pub fn has_logs(self) -> bool {
        matches!(
            self,
            JobStatus::Running | JobStatus::Succeeded | JobStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Pending => "PENDING",
            JobStatus::Runnable => "RUNNABLE",
            JobStatus::Starting => "STARTING",
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Terminating => "TERMINATING",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "SUBMITTED" => JobStatus::Submitted,
            "PENDING" => JobStatus::Pending,
            "RUNNABLE" => JobStatus::Runnable,
            "STARTING" => JobStatus::Starting,
            "RUNNING" => JobStatus::Running,
            "SUCCEEDED" => JobStatus::Succeeded,
            "FAILED" => JobStatus::Failed,
            other => {
                return Err(Error::compute(
                    "describe_job",
                    format!("unknown job status '{other}'"),
                ))
            }
        })
    }
}

/// Everything needed to submit one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitJobRequest {
    pub job_name: String,
    pub job_queue: String,
    pub job_definition: String,
    pub environment: Vec<(String, String)>,
    pub memory_mib: i64,
    pub vcpus: i64,
    pub retry_attempts: i64,
}

/// Current state of a submitted job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescription {
    pub status: JobStatus,
    pub status_reason: Option<String>,
    pub exit_code: Option<i32>,
    pub log_stream_name: Option<String>,
    /// Log group from the container's log configuration, if any
    pub log_group_name: Option<String>,
}

impl JobDescription {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            status_reason: None,
            exit_code: None,
            log_stream_name: None,
            log_group_name: None,
        }
    }
}

/// One page of log lines, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPage {
    pub events: Vec<String>,
    /// Token for reading on from the end of this page
    pub next_forward_token: Option<String>,
}

/// Managed batch-compute service plus its log service
///
/// Implementations do their own bounded retrying; errors returned here are
/// final.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Submit a job and return its id
    async fn submit_job(&self, request: SubmitJobRequest) -> Result<String>;

    async fn describe_job(&self, job_id: &str) -> Result<JobDescription>;

    async fn terminate_job(&self, job_id: &str, reason: &str) -> Result<()>;

    /// Log events after `next_token`, or from the start of the stream
    async fn get_log_events(
        &self,
        log_group: &str,
        log_stream: &str,
        next_token: Option<String>,
    ) -> Result<LogPage>;
}
