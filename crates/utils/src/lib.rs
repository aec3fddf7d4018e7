//! Shared utilities for swipe
//!
//! Atomic file writes, jittered retries and tracing setup used across the
//! workspace.

pub mod atomic_file;
pub mod retry;
pub mod tracing;

pub use atomic_file::*;
pub use retry::*;
