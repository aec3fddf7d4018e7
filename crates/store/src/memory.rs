//! In-process object store
//!
//! Used by local runs without remote storage and by tests. Besides the
//! port operations it records how many times each object was written and
//! can be told to fail upcoming requests.

use crate::object_store::{ObjectStore, Tag};
use crate::uri::ObjectUri;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use swipe_core::{Error, Result, StoreErrorKind};

/// Port operation, for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Put,
    GetTags,
    PutTags,
    DeleteTags,
}

impl StoreOp {
    fn name(self) -> &'static str {
        match self {
            StoreOp::Get => "get",
            StoreOp::Put => "put",
            StoreOp::GetTags => "get_tags",
            StoreOp::PutTags => "put_tags",
            StoreOp::DeleteTags => "delete_tags",
        }
    }
}

#[derive(Debug, Default)]
struct StoredObject {
    body: Bytes,
    tags: Vec<Tag>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectUri, StoredObject>,
    put_counts: HashMap<ObjectUri, usize>,
    failures: HashMap<StoreOp, Vec<StoreErrorKind>>,
    tag_requests: usize,
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    state: Mutex<State>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` requests of `op` fail with `kind`
    pub fn fail_next(&self, op: StoreOp, kind: StoreErrorKind, times: usize) {
        let mut state = self.state.lock();
        let queue = state.failures.entry(op).or_default();
        queue.extend(std::iter::repeat(kind).take(times));
    }

    /// Insert an object directly, bypassing failure injection
    pub fn insert(&self, uri: &str, body: impl Into<Bytes>, tags: Vec<Tag>) -> Result<()> {
        let uri = ObjectUri::parse(uri)?;
        self.state.lock().objects.insert(
            uri,
            StoredObject {
                body: body.into(),
                tags,
            },
        );
        Ok(())
    }

    pub fn object(&self, uri: &str) -> Option<Bytes> {
        let uri = ObjectUri::parse(uri).ok()?;
        self.state.lock().objects.get(&uri).map(|o| o.body.clone())
    }

    pub fn tags(&self, uri: &str) -> Option<Vec<Tag>> {
        let uri = ObjectUri::parse(uri).ok()?;
        self.state.lock().objects.get(&uri).map(|o| o.tags.clone())
    }

    /// How many times `uri` was written through the port
    pub fn put_count(&self, uri: &str) -> usize {
        ObjectUri::parse(uri)
            .ok()
            .and_then(|uri| self.state.lock().put_counts.get(&uri).copied())
            .unwrap_or(0)
    }

    /// Total number of tag read/write/delete requests served or failed
    pub fn tag_requests(&self) -> usize {
        self.state.lock().tag_requests
    }

    /// Every stored object URI, sorted
    pub fn uris(&self) -> Vec<String> {
        self.state
            .lock()
            .objects
            .keys()
            .map(ToString::to_string)
            .collect()
    }

    fn check(state: &mut State, op: StoreOp, uri: &ObjectUri) -> Result<()> {
        if matches!(op, StoreOp::GetTags | StoreOp::PutTags | StoreOp::DeleteTags) {
            state.tag_requests += 1;
        }
        let Some(queue) = state.failures.get_mut(&op) else {
            return Ok(());
        };
        if queue.is_empty() {
            return Ok(());
        }
        let kind = queue.remove(0);
        Err(Error::object_store(
            uri.to_string(),
            op.name(),
            kind,
            "injected failure",
        ))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, uri: &ObjectUri) -> Result<Option<Bytes>> {
        let mut state = self.state.lock();
        Self::check(&mut state, StoreOp::Get, uri)?;
        Ok(state.objects.get(uri).map(|o| o.body.clone()))
    }

    async fn put(&self, uri: &ObjectUri, body: Bytes) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, StoreOp::Put, uri)?;
        state.objects.insert(
            uri.clone(),
            StoredObject {
                body,
                tags: Vec::new(),
            },
        );
        *state.put_counts.entry(uri.clone()).or_default() += 1;
        Ok(())
    }

    async fn get_tags(&self, uri: &ObjectUri) -> Result<Vec<Tag>> {
        let mut state = self.state.lock();
        Self::check(&mut state, StoreOp::GetTags, uri)?;
        state
            .objects
            .get(uri)
            .map(|o| o.tags.clone())
            .ok_or_else(|| Error::not_found(uri.to_string(), "get_tags"))
    }

    async fn put_tags(&self, uri: &ObjectUri, tags: Vec<Tag>) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, StoreOp::PutTags, uri)?;
        let object = state
            .objects
            .get_mut(uri)
            .ok_or_else(|| Error::not_found(uri.to_string(), "put_tags"))?;
        object.tags = tags;
        Ok(())
    }

    async fn delete_tags(&self, uri: &ObjectUri) -> Result<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, StoreOp::DeleteTags, uri)?;
        let object = state
            .objects
            .get_mut(uri)
            .ok_or_else(|| Error::not_found(uri.to_string(), "delete_tags"))?;
        object.tags.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_replaces_tags() -> Result<()> {
        let store = MemoryObjectStore::new();
        let uri = ObjectUri::parse("s3://bucket/a.txt")?;
        store.put(&uri, Bytes::from_static(b"one")).await?;
        store.put_tags(&uri, vec![Tag::new("k", "v")]).await?;
        store.put(&uri, Bytes::from_static(b"two")).await?;

        assert_eq!(store.get_tags(&uri).await?, Vec::new());
        assert_eq!(store.put_count("s3://bucket/a.txt"), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_object() -> Result<()> {
        let store = MemoryObjectStore::new();
        let uri = ObjectUri::parse("s3://bucket/missing")?;
        assert!(store.get(&uri).await?.is_none());
        assert!(store.get_tags(&uri).await.unwrap_err().is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() -> Result<()> {
        let store = MemoryObjectStore::new();
        let uri = ObjectUri::parse("s3://bucket/x")?;
        store.fail_next(StoreOp::Put, StoreErrorKind::Throttled, 1);

        assert!(store.put(&uri, Bytes::new()).await.unwrap_err().is_throttled());
        store.put(&uri, Bytes::new()).await?;
        assert_eq!(store.put_count("s3://bucket/x"), 1);
        Ok(())
    }
}
