//! Configuration loader for swipe
//!
//! Settings come from the engine's environment-variable configuration
//! convention, `MINIWDL__<SECTION>__<KEY>`, plus a few plain variables set
//! by the surrounding orchestration.

use crate::config::{SwipeConfig, TransferConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;
use swipe_core::{Error, Result, ENV_OUTPUT_URI};

const UPLOAD_SECTION: &str = "S3_PROGRESSIVE_UPLOAD";
const CALL_CACHE_SECTION: &str = "CALL_CACHE";

/// Orchestration variables forwarded to remote jobs when set
const PASSTHROUGH_ENV: [&str; 3] = ["WDL_WORKFLOW_URI", "SFN_EXECUTION_ID", "SFN_CURRENT_STATE"];

/// Enables the per-run status manifest
const STATUS_ENV: &str = "OUTPUT_STATUS_JSON_FILES";

/// Builds a [`SwipeConfig`] from a variable lookup
pub struct ConfigLoader<F> {
    lookup: F,
}

impl ConfigLoader<fn(&str) -> Option<String>> {
    /// Loader reading the process environment
    pub fn from_env() -> Self {
        fn process_env(name: &str) -> Option<String> {
            std::env::var(name).ok()
        }
        Self {
            lookup: process_env as fn(&str) -> Option<String>,
        }
    }
}

impl<F> ConfigLoader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Loader reading from an arbitrary lookup, e.g. a map in tests
    pub fn from_lookup(lookup: F) -> Self {
        Self { lookup }
    }

    /// Load and validate the configuration
    pub fn load(&self) -> Result<SwipeConfig> {
        let mut config = SwipeConfig::default();

        config.upload.uri_prefix = self.setting(UPLOAD_SECTION, "URI_PREFIX");
        config.upload.call_cache_get_uri_prefix =
            self.setting(UPLOAD_SECTION, "CALL_CACHE_GET_URI_PREFIX");
        config.upload.output_uri = self.var(ENV_OUTPUT_URI);

        if let Some(get) = self.setting(CALL_CACHE_SECTION, "GET") {
            config.call_cache.get = parse_bool(CALL_CACHE_SECTION, "GET", &get)?;
        }
        if let Some(put) = self.setting(CALL_CACHE_SECTION, "PUT") {
            config.call_cache.put = parse_bool(CALL_CACHE_SECTION, "PUT", &put)?;
        }
        config.call_cache.dir = match self.setting(CALL_CACHE_SECTION, "DIR") {
            Some(dir) => self.expand_home(&dir),
            None => self.expand_home("~/.cache/miniwdl"),
        };

        config.batch.job_definition = self.setting(UPLOAD_SECTION, "BATCH_JOB_DEFINITION");
        if let Some(queues) = self.setting(UPLOAD_SECTION, "BATCH_QUEUES") {
            config.batch.queues = parse_queues(&queues)?;
        }
        config.batch.passthrough_env = PASSTHROUGH_ENV
            .iter()
            .filter_map(|name| self.var(name).map(|value| (name.to_string(), value)))
            .collect();

        config.status.enabled = self.var(STATUS_ENV).as_deref() == Some("true");

        let defaults = TransferConfig::default();
        config.transfer = TransferConfig {
            program: self
                .setting(UPLOAD_SECTION, "TRANSFER_PROGRAM")
                .unwrap_or(defaults.program),
            max_retries: match self.setting(UPLOAD_SECTION, "TRANSFER_MAX_RETRIES") {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    Error::configuration(format!(
                        "{} must be a non-negative integer, got '{raw}'",
                        setting_name(UPLOAD_SECTION, "TRANSFER_MAX_RETRIES")
                    ))
                })?,
                None => defaults.max_retries,
            },
        };

        config.validate()?;

        tracing::debug!(
            upload_prefix = ?config.upload.uri_prefix,
            cache_get = config.call_cache.get,
            cache_put = config.call_cache.put,
            batch_tasks = config.batch.queues.len(),
            status = config.status.enabled,
            "loaded swipe configuration"
        );

        Ok(config)
    }

    fn var(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.is_empty())
    }

    fn setting(&self, section: &str, key: &str) -> Option<String> {
        self.var(&setting_name(section, key))
    }

    fn expand_home(&self, path: &str) -> PathBuf {
        match (path.strip_prefix("~/"), self.var("HOME")) {
            (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
            _ => PathBuf::from(path),
        }
    }
}

fn setting_name(section: &str, key: &str) -> String {
    format!("MINIWDL__{section}__{key}")
}

fn parse_bool(section: &str, key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err(Error::configuration(format!(
            "{} must be a boolean, got '{raw}'",
            setting_name(section, key)
        ))),
    }
}

fn parse_queues(raw: &str) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(raw).map_err(|e| {
        Error::configuration(format!(
            "{} must be a JSON object of task name to queue: {e}",
            setting_name(UPLOAD_SECTION, "BATCH_QUEUES")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<SwipeConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigLoader::from_lookup(move |name: &str| map.get(name).cloned()).load()
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = load(&[("HOME", "/home/runner")]).unwrap();
        assert!(config.upload.put_prefix().is_none());
        assert!(!config.call_cache.get);
        assert!(!config.status.enabled);
        assert_eq!(config.call_cache.dir, PathBuf::from("/home/runner/.cache/miniwdl"));
        assert_eq!(config.transfer.program, "s3parcp");
        assert_eq!(config.batch.default_log_group, "/aws/batch/job");
    }

    #[test]
    fn test_full_environment() {
        let config = load(&[
            ("MINIWDL__S3_PROGRESSIVE_UPLOAD__URI_PREFIX", "s3://bucket/run-1"),
            ("MINIWDL__S3_PROGRESSIVE_UPLOAD__BATCH_JOB_DEFINITION", "swipe:7"),
            (
                "MINIWDL__S3_PROGRESSIVE_UPLOAD__BATCH_QUEUES",
                r#"{"align": "spot", "assemble": "on-demand"}"#,
            ),
            ("MINIWDL__CALL_CACHE__GET", "true"),
            ("MINIWDL__CALL_CACHE__PUT", "1"),
            ("MINIWDL__CALL_CACHE__DIR", "/tmp/cache"),
            ("WDL_OUTPUT_URI", "s3://bucket/final/outputs.json"),
            ("OUTPUT_STATUS_JSON_FILES", "true"),
            ("SFN_EXECUTION_ID", "exec-42"),
        ])
        .unwrap();

        assert_eq!(config.upload.get_prefix(), Some("s3://bucket/run-1"));
        assert_eq!(
            config.upload.output_uri.as_deref(),
            Some("s3://bucket/final/outputs.json")
        );
        assert!(config.call_cache.get && config.call_cache.put);
        assert_eq!(config.call_cache.dir, PathBuf::from("/tmp/cache"));
        assert_eq!(config.batch.queue_for("assemble"), Some("on-demand"));
        assert_eq!(
            config.batch.passthrough_env.get("SFN_EXECUTION_ID").map(String::as_str),
            Some("exec-42")
        );
        assert!(!config.batch.passthrough_env.contains_key("WDL_WORKFLOW_URI"));
        assert!(config.status.enabled);
    }

    #[rstest]
    #[case::local_prefix(&[("MINIWDL__S3_PROGRESSIVE_UPLOAD__URI_PREFIX", "/data/out")])]
    #[case::bad_bool(&[("MINIWDL__CALL_CACHE__PUT", "maybe")])]
    #[case::bad_queues(&[
        ("MINIWDL__S3_PROGRESSIVE_UPLOAD__URI_PREFIX", "s3://b/p"),
        ("MINIWDL__S3_PROGRESSIVE_UPLOAD__BATCH_QUEUES", "[\"align\"]"),
    ])]
    fn test_invalid_settings_are_rejected(#[case] vars: &[(&str, &str)]) {
        let err = load(vars).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_status_requires_literal_true() {
        let config = load(&[("OUTPUT_STATUS_JSON_FILES", "1")]).unwrap();
        assert!(!config.status.enabled);
    }
}
