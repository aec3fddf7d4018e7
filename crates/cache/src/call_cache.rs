use async_trait::async_trait;
use std::collections::BTreeMap;
use swipe_core::{Bindings, Result, ValueType};

/// Declared output name -> type of a task
pub type OutputTypes = BTreeMap<String, ValueType>;

/// The engine's call cache contract
#[async_trait]
pub trait CallCache: Send + Sync {
    /// Cached outputs for `key`, or `None` on a miss
    async fn get(
        &self,
        key: &str,
        inputs: &Bindings,
        output_types: &OutputTypes,
    ) -> Result<Option<Bindings>>;

    /// Store outputs for `key`
    async fn put(&self, key: &str, outputs: &Bindings) -> Result<()>;
}
