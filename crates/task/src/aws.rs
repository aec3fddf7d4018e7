//! AWS Batch and CloudWatch Logs implementation of the compute port.

use crate::compute::{ComputeApi, JobDescription, JobStatus, LogPage, SubmitJobRequest};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_sdk_batch::error::DisplayErrorContext;
use aws_sdk_batch::types::{
    ContainerOverrides, JobStatus as BatchJobStatus, KeyValuePair, ResourceRequirement,
    ResourceType, RetryStrategy,
};
use swipe_core::{Error, Result};

const BATCH_MAX_ATTEMPTS: u32 = 20;
const LOG_PAGE_LIMIT: i32 = 10_000;

pub struct BatchComputeApi {
    batch: aws_sdk_batch::Client,
    logs: aws_sdk_cloudwatchlogs::Client,
}

impl BatchComputeApi {
    /// Build both clients from the ambient AWS configuration.
    ///
    /// The Batch client retries adaptively, since describe calls from many
    /// concurrent tasks are easily throttled.
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let batch_config = aws_sdk_batch::config::Builder::from(&sdk_config)
            .retry_config(RetryConfig::adaptive().with_max_attempts(BATCH_MAX_ATTEMPTS))
            .build();
        Self {
            batch: aws_sdk_batch::Client::from_conf(batch_config),
            logs: aws_sdk_cloudwatchlogs::Client::new(&sdk_config),
        }
    }

    pub fn from_clients(batch: aws_sdk_batch::Client, logs: aws_sdk_cloudwatchlogs::Client) -> Self {
        Self { batch, logs }
    }
}

fn compute_error(operation: &str, err: impl std::error::Error) -> Error {
    Error::compute(operation, DisplayErrorContext(err).to_string())
}

fn resource(kind: ResourceType, value: i64) -> Result<ResourceRequirement> {
    ResourceRequirement::builder()
        .r#type(kind)
        .value(value.to_string())
        .build()
        .map_err(|e| compute_error("submit_job", e))
}

fn to_i32(name: &str, value: i64) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::compute("submit_job", format!("{name} {value} is out of range")))
}

fn job_status(status: Option<&BatchJobStatus>) -> Result<JobStatus> {
    let status = status.ok_or_else(|| Error::compute("describe_job", "job has no status"))?;
    status.as_str().parse()
}

#[async_trait]
impl ComputeApi for BatchComputeApi {
    async fn submit_job(&self, request: SubmitJobRequest) -> Result<String> {
        let environment = request
            .environment
            .into_iter()
            .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
            .collect::<Vec<_>>();
        let overrides = ContainerOverrides::builder()
            .set_environment(Some(environment))
            .resource_requirements(resource(ResourceType::Memory, request.memory_mib)?)
            .resource_requirements(resource(ResourceType::Vcpu, request.vcpus)?)
            .build();

        let output = self
            .batch
            .submit_job()
            .job_name(request.job_name)
            .job_queue(request.job_queue)
            .job_definition(request.job_definition)
            .container_overrides(overrides)
            .retry_strategy(
                RetryStrategy::builder()
                    .attempts(to_i32("retry attempts", request.retry_attempts)?)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| compute_error("submit_job", e))?;
        Ok(output.job_id().to_string())
    }

    async fn describe_job(&self, job_id: &str) -> Result<JobDescription> {
        let output = self
            .batch
            .describe_jobs()
            .jobs(job_id)
            .send()
            .await
            .map_err(|e| compute_error("describe_jobs", e))?;
        let detail = output
            .jobs()
            .first()
            .ok_or_else(|| Error::compute("describe_jobs", format!("job {job_id} not found")))?;

        let mut description = JobDescription::new(job_status(Option::from(detail.status()))?);
        description.status_reason = detail.status_reason().map(str::to_string);
        if let Some(container) = detail.container() {
            description.exit_code = container.exit_code();
            description.log_stream_name = container.log_stream_name().map(str::to_string);
            description.log_group_name = container
                .log_configuration()
                .and_then(|config| config.options())
                .and_then(|options| options.get("awslogs-group"))
                .cloned();
        }
        Ok(description)
    }

    async fn terminate_job(&self, job_id: &str, reason: &str) -> Result<()> {
        self.batch
            .terminate_job()
            .job_id(job_id)
            .reason(reason)
            .send()
            .await
            .map_err(|e| compute_error("terminate_job", e))?;
        Ok(())
    }

    async fn get_log_events(
        &self,
        log_group: &str,
        log_stream: &str,
        next_token: Option<String>,
    ) -> Result<LogPage> {
        let output = self
            .logs
            .get_log_events()
            .log_group_name(log_group)
            .log_stream_name(log_stream)
            .limit(LOG_PAGE_LIMIT)
            .start_from_head(true)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| compute_error("get_log_events", e))?;
        Ok(LogPage {
            events: output
                .events()
                .iter()
                .filter_map(|event| event.message().map(str::to_string))
                .collect(),
            next_forward_token: output.next_forward_token().map(str::to_string),
        })
    }
}
