//! Per-run status manifest
//!
//! `<prefix>/<workflow>_status2.json` maps each step name to its current
//! status. Tasks start and finish concurrently, so the whole document is kept
//! in memory behind an async lock and re-uploaded after every change. On the
//! first update of a process the document is seeded from the store, so a run
//! resumed through the call cache keeps the steps recorded earlier.
//!
//! Status updates are best effort: failures are logged and never reach the
//! task.

use crate::context::{TaskContext, TaskDefinition};
use crate::protocol::TaskHook;
use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use swipe_config::SwipeConfig;
use swipe_core::{join_uri, Bindings, Error, Result, RunId, Value, STATUS_MANIFEST_SUFFIX};
use swipe_store::{ObjectStore, ObjectUri};
use tokio::sync::Mutex;

static STEP_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"--step-name\s+(\S+)\s").expect("valid regex"));

const DESCRIPTION_OUTPUT: &str = "step_description_md";
const USER_ERROR: &str = "InvalidInputFileError";

/// Seconds since the epoch, as a decimal string
pub fn epoch_seconds() -> String {
    let now = chrono::Utc::now();
    format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
}

/// Status key for a task: its `--step-name` argument, else the task name
pub fn step_name(task: &TaskDefinition) -> String {
    STEP_NAME
        .captures_iter(&task.command)
        .last()
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str().to_string())
        .unwrap_or_else(|| task.name.clone())
}

pub struct StatusRecorder {
    config: Arc<SwipeConfig>,
    store: Arc<dyn ObjectStore>,
    document: Mutex<Option<Map<String, JsonValue>>>,
}

impl StatusRecorder {
    pub fn new(config: Arc<SwipeConfig>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            config,
            store,
            document: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.status.enabled && self.config.upload.put_prefix().is_some()
    }

    pub fn manifest_uri(&self, run_id: &RunId) -> Option<String> {
        let prefix = self.config.upload.put_prefix()?;
        let workflow = run_id.workflow_name()?;
        Some(join_uri(prefix, &format!("{workflow}{STATUS_MANIFEST_SUFFIX}")))
    }

    /// Merge `entries` into the step's status and persist the document
    pub async fn update(&self, run_id: &RunId, task: &TaskDefinition, entries: Map<String, JsonValue>) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = self.try_update(run_id, task, entries).await {
            tracing::error!(run_id = %run_id, error = %e, "update_status_json failed");
        }
    }

    async fn try_update(
        &self,
        run_id: &RunId,
        task: &TaskDefinition,
        entries: Map<String, JsonValue>,
    ) -> Result<()> {
        let uri = self
            .manifest_uri(run_id)
            .ok_or_else(|| Error::value(format!("cannot name a status manifest for '{run_id}'")))?;
        let target = ObjectUri::parse(&uri)?;
        let step = step_name(task);

        let mut document = self.document.lock().await;
        if document.is_none() {
            *document = Some(self.load(&target).await?);
        }
        let Some(steps) = document.as_mut() else {
            return Ok(());
        };

        let status = steps
            .entry(step.clone())
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if !status.is_object() {
            *status = JsonValue::Object(Map::new());
        }
        if let Some(status) = status.as_object_mut() {
            status.extend(entries);
        }
        tracing::debug!(step = %step, status = %steps[&step], "update_status_json");

        let body = serde_json::to_vec(&*steps)?;
        self.store.put(&target, Bytes::from(body)).await
    }

    async fn load(&self, target: &ObjectUri) -> Result<Map<String, JsonValue>> {
        match self.store.get(target).await? {
            Some(body) => match serde_json::from_slice(&body)? {
                JsonValue::Object(steps) => Ok(steps),
                _ => Err(Error::value(format!("{target} is not a JSON object"))),
            },
            None => Ok(Map::new()),
        }
    }

    pub async fn snapshot(&self) -> Option<Map<String, JsonValue>> {
        self.document.lock().await.clone()
    }
}

/// Remembers the last JSON object a task wrote to stderr
#[derive(Debug)]
pub struct StderrTracker {
    started: Instant,
    last_json: parking_lot::Mutex<Option<Map<String, JsonValue>>>,
}

impl StderrTracker {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_json: parking_lot::Mutex::new(None),
        }
    }

    /// Log one stderr line, structured when it is a JSON object
    pub fn observe(&self, line: &str) {
        let trimmed = line.trim();
        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            if let Ok(JsonValue::Object(mut fields)) = serde_json::from_str::<JsonValue>(trimmed) {
                let message = fields
                    .remove("message")
                    .or_else(|| fields.remove("msg"))
                    .and_then(|m| m.as_str().map(|m| m.trim().to_string()))
                    .unwrap_or_default();
                tracing::debug!(target: "swipe::stderr", fields = %JsonValue::Object(fields.clone()), "{message}");
                *self.last_json.lock() = Some(fields);
                return;
            }
        }
        tracing::debug!(target: "swipe::stderr", "{}", line.trim_end());
    }

    pub fn last_json(&self) -> Option<Map<String, JsonValue>> {
        self.last_json.lock().clone()
    }
}

/// Status entries for a failed task
fn failure_entries(error: &Error, last_json: Option<&Map<String, JsonValue>>) -> Map<String, JsonValue> {
    let mut entries = Map::new();
    let mut status = "pipeline_errored";
    let mut message = JsonValue::String(error.to_string());

    if let Some(json) = last_json.filter(|json| json.contains_key("wdl_error_message")) {
        message = json
            .get("cause")
            .or_else(|| json.get("wdl_error_message"))
            .cloned()
            .unwrap_or(JsonValue::Null);
        if json.get("error").and_then(JsonValue::as_str) == Some(USER_ERROR) {
            status = "user_errored";
        }
        if let Some(description) = json.get(DESCRIPTION_OUTPUT) {
            entries.insert("description".into(), description.clone());
        }
    }

    entries.insert("status".into(), status.into());
    entries.insert("error".into(), message);
    entries.insert("end_time".into(), epoch_seconds().into());
    entries
}

/// Records task start and finish in the status manifest
pub struct StatusHook {
    recorder: Arc<StatusRecorder>,
    trackers: parking_lot::Mutex<HashMap<String, Arc<StderrTracker>>>,
}

impl StatusHook {
    pub fn new(recorder: Arc<StatusRecorder>) -> Self {
        Self {
            recorder,
            trackers: parking_lot::Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TaskHook for StatusHook {
    async fn before(&self, ctx: &mut TaskContext) -> Result<()> {
        let mut entries = Map::new();
        entries.insert("status".into(), "running".into());
        entries.insert("start_time".into(), epoch_seconds().into());
        self.recorder.update(&ctx.run_id, &ctx.task, entries).await;

        let tracker = Arc::new(StderrTracker::new());
        self.trackers
            .lock()
            .insert(ctx.run_id.to_string(), tracker.clone());
        ctx.container
            .add_stderr_callback(Arc::new(move |line: &str| tracker.observe(line)));
        Ok(())
    }

    async fn after(&self, ctx: &TaskContext, result: Result<Bindings>) -> Result<Bindings> {
        let tracker = self.trackers.lock().remove(&ctx.run_id.to_string());

        match result {
            Ok(outputs) => {
                if let Some(tracker) = &tracker {
                    tracing::info!(
                        run_id = ctx.run_id.last().unwrap_or_default(),
                        task_name = %ctx.task.name,
                        elapsed_seconds = tracker.started.elapsed().as_secs_f64(),
                        "task done"
                    );
                }
                let mut entries = Map::new();
                entries.insert("status".into(), "uploaded".into());
                entries.insert("end_time".into(), epoch_seconds().into());
                if let Some(Value::String(description)) = outputs.get(DESCRIPTION_OUTPUT) {
                    entries.insert("description".into(), description.clone().into());
                }
                self.recorder.update(&ctx.run_id, &ctx.task, entries).await;
                Ok(outputs)
            }
            Err(e) => {
                let last_json = tracker.as_ref().and_then(|t| t.last_json());
                let entries = failure_entries(&e, last_json.as_ref());
                self.recorder.update(&ctx.run_id, &ctx.task, entries).await;
                Err(e)
            }
        }
    }
}
