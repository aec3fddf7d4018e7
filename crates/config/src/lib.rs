//! Configuration for swipe
//!
//! [`SwipeConfig`] is immutable after construction and is shared by every
//! hook, cache and runner through an `Arc`. [`ConfigLoader`] builds it from
//! the engine's `MINIWDL__<SECTION>__<KEY>` environment variables.

pub mod config;
pub mod loader;

pub use config::{
    BatchConfig, CallCacheConfig, StatusConfig, SwipeConfig, SwipeConfigBuilder, TransferConfig,
    UploadConfig,
};
pub use loader::ConfigLoader;
