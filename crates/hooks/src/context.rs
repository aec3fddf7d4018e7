use std::path::PathBuf;
use std::sync::Arc;
use swipe_core::{Bindings, RunId};

/// The parts of a task definition the hooks look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub name: String,
    /// Command template as written in the task
    pub command: String,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

pub type StderrCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Container settings hooks may adjust before the task runs
#[derive(Default, Clone)]
pub struct ContainerSettings {
    stderr_callbacks: Vec<StderrCallback>,
}

impl ContainerSettings {
    pub fn add_stderr_callback(&mut self, callback: StderrCallback) {
        self.stderr_callbacks.push(callback);
    }

    pub fn stderr_callback_count(&self) -> usize {
        self.stderr_callbacks.len()
    }

    /// Hand one stderr line to every registered callback
    pub fn emit_stderr(&self, line: &str) {
        for callback in &self.stderr_callbacks {
            callback(line);
        }
    }
}

impl std::fmt::Debug for ContainerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerSettings")
            .field("stderr_callbacks", &self.stderr_callbacks.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TaskContext {
    pub run_id: RunId,
    pub run_dir: PathBuf,
    pub task: TaskDefinition,
    pub inputs: Bindings,
    pub container: ContainerSettings,
}

impl TaskContext {
    pub fn new(run_id: RunId, run_dir: impl Into<PathBuf>, task: TaskDefinition, inputs: Bindings) -> Self {
        Self {
            run_id,
            run_dir: run_dir.into(),
            task,
            inputs,
            container: ContainerSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub run_id: RunId,
    pub run_dir: PathBuf,
    pub workflow_name: String,
    pub inputs: Bindings,
}

impl WorkflowContext {
    pub fn new(
        run_id: RunId,
        run_dir: impl Into<PathBuf>,
        workflow_name: impl Into<String>,
        inputs: Bindings,
    ) -> Self {
        Self {
            run_id,
            run_dir: run_dir.into(),
            workflow_name: workflow_name.into(),
            inputs,
        }
    }
}
