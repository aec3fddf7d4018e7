//! Configuration data for swipe
//!
//! Every section has a `Default` that matches the engine running with no
//! swipe variables set: no upload prefix (upload and remote caching are
//! no-ops), call cache switches off, no batch routing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use swipe_core::{constants::DEFAULT_LOG_GROUP, Error, Result, REMOTE_URI_SCHEME};

/// Immutable configuration shared by all swipe components
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwipeConfig {
    pub upload: UploadConfig,
    pub call_cache: CallCacheConfig,
    pub batch: BatchConfig,
    pub status: StatusConfig,
    pub transfer: TransferConfig,
}

/// Where task outputs and cache entries are written
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Remote prefix for uploads and new cache entries
    pub uri_prefix: Option<String>,
    /// Remote prefix cache entries are read from; defaults to `uri_prefix`
    pub call_cache_get_uri_prefix: Option<String>,
    /// Explicit destination for the final output manifest
    pub output_uri: Option<String>,
}

impl UploadConfig {
    pub fn put_prefix(&self) -> Option<&str> {
        self.uri_prefix.as_deref()
    }

    pub fn get_prefix(&self) -> Option<&str> {
        self.call_cache_get_uri_prefix
            .as_deref()
            .or_else(|| self.put_prefix())
    }
}

/// Call cache switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallCacheConfig {
    pub get: bool,
    pub put: bool,
    /// Local directory holding `<key>.json` entries
    pub dir: PathBuf,
}

impl Default for CallCacheConfig {
    fn default() -> Self {
        Self {
            get: false,
            put: false,
            dir: PathBuf::from(".cache/miniwdl"),
        }
    }
}

/// Remote batch execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub job_definition: Option<String>,
    /// Task name -> job queue; tasks not listed run locally
    pub queues: BTreeMap<String, String>,
    /// Log group used when a job description names none
    pub default_log_group: String,
    /// Environment forwarded unchanged to every submitted job
    pub passthrough_env: BTreeMap<String, String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            job_definition: None,
            queues: BTreeMap::new(),
            default_log_group: DEFAULT_LOG_GROUP.to_string(),
            passthrough_env: BTreeMap::new(),
        }
    }
}

impl BatchConfig {
    pub fn queue_for(&self, task_name: &str) -> Option<&str> {
        self.queues.get(task_name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusConfig {
    pub enabled: bool,
}

/// External copy program invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    pub program: String,
    pub max_retries: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            program: "s3parcp".to_string(),
            max_retries: 10,
        }
    }
}

impl SwipeConfig {
    pub fn builder() -> SwipeConfigBuilder {
        SwipeConfigBuilder::new()
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        for (name, prefix) in [
            ("uri_prefix", &self.upload.uri_prefix),
            (
                "call_cache_get_uri_prefix",
                &self.upload.call_cache_get_uri_prefix,
            ),
        ] {
            if let Some(prefix) = prefix {
                if !prefix.starts_with(REMOTE_URI_SCHEME) {
                    return Err(Error::configuration(format!(
                        "{name} must start with {REMOTE_URI_SCHEME}, got '{prefix}'"
                    )));
                }
            }
        }

        if !self.batch.queues.is_empty() {
            if self.batch.job_definition.is_none() {
                return Err(Error::configuration(
                    "batch_queues is set but batch_job_definition is not",
                ));
            }
            if self.upload.get_prefix().is_none() {
                return Err(Error::configuration(
                    "batch_queues is set but no upload prefix is configured",
                ));
            }
        }

        Ok(())
    }
}

/// Builder for creating swipe configurations
pub struct SwipeConfigBuilder {
    config: SwipeConfig,
}

impl SwipeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SwipeConfig::default(),
        }
    }

    pub fn upload_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.upload.uri_prefix = Some(prefix.into());
        self
    }

    pub fn cache_get_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.upload.call_cache_get_uri_prefix = Some(prefix.into());
        self
    }

    pub fn output_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.upload.output_uri = Some(uri.into());
        self
    }

    pub fn call_cache(mut self, get: bool, put: bool, dir: impl Into<PathBuf>) -> Self {
        self.config.call_cache = CallCacheConfig {
            get,
            put,
            dir: dir.into(),
        };
        self
    }

    pub fn job_definition(mut self, definition: impl Into<String>) -> Self {
        self.config.batch.job_definition = Some(definition.into());
        self
    }

    pub fn batch_queue(mut self, task_name: impl Into<String>, queue: impl Into<String>) -> Self {
        self.config.batch.queues.insert(task_name.into(), queue.into());
        self
    }

    pub fn passthrough_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .batch
            .passthrough_env
            .insert(name.into(), value.into());
        self
    }

    pub fn status_enabled(mut self, enabled: bool) -> Self {
        self.config.status.enabled = enabled;
        self
    }

    pub fn transfer(mut self, program: impl Into<String>, max_retries: u32) -> Self {
        self.config.transfer = TransferConfig {
            program: program.into(),
            max_retries,
        };
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<SwipeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for SwipeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_prefix_falls_back_to_put_prefix() {
        let config = SwipeConfig::builder()
            .upload_prefix("s3://bucket/run")
            .build()
            .unwrap();
        assert_eq!(config.upload.get_prefix(), Some("s3://bucket/run"));

        let config = SwipeConfig::builder()
            .upload_prefix("s3://bucket/run")
            .cache_get_prefix("s3://shared/cache-root")
            .build()
            .unwrap();
        assert_eq!(config.upload.get_prefix(), Some("s3://shared/cache-root"));
    }

    #[test]
    fn test_prefix_must_be_remote() {
        let err = SwipeConfig::builder()
            .upload_prefix("/local/dir")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("uri_prefix"));
    }

    #[test]
    fn test_batch_routing_needs_job_definition() {
        let result = SwipeConfig::builder()
            .upload_prefix("s3://bucket/run")
            .batch_queue("align", "gpu-queue")
            .build();
        assert!(result.is_err());

        let config = SwipeConfig::builder()
            .upload_prefix("s3://bucket/run")
            .job_definition("swipe-job:3")
            .batch_queue("align", "gpu-queue")
            .build()
            .unwrap();
        assert_eq!(config.batch.queue_for("align"), Some("gpu-queue"));
        assert_eq!(config.batch.queue_for("other"), None);
    }
}
