//! Engine hooks for swipe
//!
//! The [`Coordinator`] owns the shared upload ledger, copy gate and call
//! cache, and hands out a [`HookChain`] with:
//! - [`StatusHook`]: per-run status manifest, updated at task start and end
//! - [`ProgressiveUpload`]: uploads each task's outputs as soon as it finishes
//! - [`OutputManifest`]: writes `outputs.s3.json` when the workflow finishes

pub mod context;
pub mod coordinator;
pub mod manifest;
pub mod protocol;
pub mod status;
pub mod upload;

pub use context::{ContainerSettings, StderrCallback, TaskContext, TaskDefinition, WorkflowContext};
pub use coordinator::Coordinator;
pub use manifest::OutputManifest;
pub use protocol::{HookChain, TaskHook, WorkflowHook};
pub use status::{StatusHook, StatusRecorder, StderrTracker};
pub use upload::{classify_output, OutputShape, ProgressiveUpload};
