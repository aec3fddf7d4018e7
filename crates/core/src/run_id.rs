use crate::constants::DOWNLOAD_STEP_PREFIX;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static CALL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"call-([^-]+)(-\d+)?$").expect("valid regex"));

/// Path of names from the workflow root down to one step,
/// e.g. `["wf_short_read_mngs", "call-validate_input"]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Vec<String>);

impl RunId {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Every element after the workflow root
    pub fn tail(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }

    /// Synthetic download steps produce no outputs worth uploading
    pub fn is_download_step(&self) -> bool {
        self.last()
            .is_some_and(|last| last.starts_with(DOWNLOAD_STEP_PREFIX))
    }

    /// Workflow name as used for status manifests: the root element with its
    /// first `_`-separated word dropped (`wf_host_filter` -> `host_filter`).
    pub fn workflow_name(&self) -> Option<String> {
        let root = self.first()?;
        let mut words = root.split('_');
        words.next();
        Some(words.collect::<Vec<_>>().join("_"))
    }

    /// Task name parsed from a `call-<name>[-<n>]` step element
    pub fn task_name(&self) -> Option<String> {
        let last = self.last()?;
        CALL_NAME
            .captures(last)
            .and_then(|captures| captures.get(1))
            .map(|name| name.as_str().to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}
