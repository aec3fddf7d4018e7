//! Call caching keyed by remote identity
//!
//! The engine computes cache keys from local paths, but entries must be
//! shareable across machines, so [`DeferredCommitCache`] rewrites both keys
//! and values to the URIs outputs were uploaded to. An entry is only made
//! durable once every output it references has been uploaded; the
//! [`UploadLedger`] tracks what has been uploaded and which entries are
//! still waiting.

pub mod call_cache;
pub mod deferred;
pub mod hashing;
pub mod ledger;
pub mod local;

pub use call_cache::{CallCache, OutputTypes};
pub use deferred::DeferredCommitCache;
pub use hashing::{cache_key, digest_bindings, durable_key};
pub use ledger::{CommitPlan, PendingCacheEntry, UploadLedger};
pub use local::LocalCallCache;
