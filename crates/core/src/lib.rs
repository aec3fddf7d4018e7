//! Core domain types, errors, and constants for swipe.
//!
//! ## Key Components
//!
//! - **`errors`**: the primary `Error` enum and `Result` alias shared by every crate.
//! - **`values`**: structured task values, their types and named bindings.
//! - **`identity`**: stable identities for output files, so links to one file
//!   are recognised as the same output.
//! - **`run_id`**: the run-identity path of a workflow step.
//! - **`constants`**: shared names for files, tags and environment variables.

pub mod constants;
pub mod errors;
pub mod identity;
pub mod run_id;
pub mod uri;
pub mod values;

pub use self::{
    constants::*,
    errors::{Error, Result, StoreErrorKind},
    identity::{is_remote_uri, FileIdentity},
    run_id::RunId,
    uri::join_uri,
    values::{Bindings, PathKind, Value, ValueType},
};
