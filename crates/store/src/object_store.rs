use crate::uri::ObjectUri;
use async_trait::async_trait;
use bytes::Bytes;
use swipe_core::Result;

/// One object tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Whole-object operations against remote storage
///
/// Errors are `Error::ObjectStore` with a kind, so callers can tell a
/// missing object from throttling or a transport failure.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Object body, or `None` when the object does not exist
    async fn get(&self, uri: &ObjectUri) -> Result<Option<Bytes>>;

    /// Create or replace an object. Replacing an object drops its tags.
    async fn put(&self, uri: &ObjectUri, body: Bytes) -> Result<()>;

    async fn get_tags(&self, uri: &ObjectUri) -> Result<Vec<Tag>>;

    async fn put_tags(&self, uri: &ObjectUri, tags: Vec<Tag>) -> Result<()>;

    async fn delete_tags(&self, uri: &ObjectUri) -> Result<()>;
}
