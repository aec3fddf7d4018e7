//! Task execution for swipe
//!
//! A [`HybridRunner`] sends tasks listed in the batch routing table to the
//! [`BatchBackend`], which submits them to a managed batch-compute service
//! through the [`ComputeApi`] port, and runs everything else with the local
//! runner.

pub mod backend;
pub mod compute;
pub mod local;
pub mod runner;

#[cfg(feature = "aws")]
pub mod aws;

pub use backend::{BatchBackend, RemoteJob};
pub use compute::{ComputeApi, JobDescription, JobStatus, LogPage, SubmitJobRequest};
pub use local::LocalProcessRunner;
pub use runner::{HybridRunner, RuntimeValues, StderrSink, TaskRequest, TaskRunner, Terminating};

#[cfg(feature = "aws")]
pub use aws::BatchComputeApi;
