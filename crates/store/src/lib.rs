//! Remote object storage for swipe
//!
//! The [`ObjectStore`] port covers the handful of whole-object operations
//! swipe needs. All uploads of task outputs go through the
//! [`RemoteCopyGate`], which serializes the external transfer tool and
//! manages the `intermediate_output` tag.

pub mod gate;
pub mod memory;
pub mod object_store;
pub mod transfer;
pub mod uri;

#[cfg(feature = "aws")]
pub mod s3;

pub use gate::{CopyPermit, RemoteCopyGate};
pub use memory::{MemoryObjectStore, StoreOp};
pub use object_store::{ObjectStore, Tag};
pub use transfer::{CommandTransferTool, StoreTransferTool, TransferOutcome, TransferTool};
pub use uri::ObjectUri;
