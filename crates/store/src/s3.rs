//! S3 implementation of the object store port.

use crate::object_store::{ObjectStore, Tag};
use crate::uri::ObjectUri;
use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Tag as S3Tag, Tagging};
use aws_sdk_s3::Client;
use bytes::Bytes;
use swipe_core::{Error, Result, StoreErrorKind};

pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Build a client from the ambient AWS configuration.
    ///
    /// `AWS_ENDPOINT_URL` is honoured by the SDK loader, which makes the
    /// store usable against S3-compatible services.
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&sdk_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn classify<E, R>(uri: &ObjectUri, operation: &str, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let kind = match &err {
        SdkError::ServiceError(service) => match service.err().code() {
            Some("NoSuchKey" | "NotFound" | "NoSuchTagSet") => StoreErrorKind::NotFound,
            Some("SlowDown" | "Throttling" | "ThrottlingException" | "RequestLimitExceeded") => {
                StoreErrorKind::Throttled
            }
            _ => StoreErrorKind::Client,
        },
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => StoreErrorKind::Transport,
        _ => StoreErrorKind::Client,
    };
    let message = match err.as_service_error() {
        Some(service) => service
            .message()
            .or(service.code())
            .unwrap_or("unknown service error")
            .to_string(),
        None => err.to_string(),
    };
    Error::object_store(uri.to_string(), operation, kind, message)
}

fn to_tagging(uri: &ObjectUri, tags: Vec<Tag>) -> Result<Tagging> {
    let tag_set = tags
        .into_iter()
        .map(|tag| S3Tag::builder().key(tag.key).value(tag.value).build())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            Error::object_store(uri.to_string(), "put_tags", StoreErrorKind::Client, e.to_string())
        })?;
    Tagging::builder()
        .set_tag_set(Some(tag_set))
        .build()
        .map_err(|e| {
            Error::object_store(uri.to_string(), "put_tags", StoreErrorKind::Client, e.to_string())
        })
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, uri: &ObjectUri) -> Result<Option<Bytes>> {
        match self
            .client
            .get_object()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .send()
            .await
        {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| {
                        Error::object_store(
                            uri.to_string(),
                            "get",
                            StoreErrorKind::Transport,
                            format!("failed to collect response body: {e}"),
                        )
                    })?
                    .into_bytes();
                Ok(Some(data))
            }
            Err(e) => {
                let err = classify(uri, "get", e);
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn put(&self, uri: &ObjectUri, body: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify(uri, "put", e))?;
        Ok(())
    }

    async fn get_tags(&self, uri: &ObjectUri) -> Result<Vec<Tag>> {
        let output = self
            .client
            .get_object_tagging()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .send()
            .await
            .map_err(|e| classify(uri, "get_tags", e))?;
        Ok(output
            .tag_set()
            .iter()
            .map(|tag| Tag::new(tag.key(), tag.value()))
            .collect())
    }

    async fn put_tags(&self, uri: &ObjectUri, tags: Vec<Tag>) -> Result<()> {
        self.client
            .put_object_tagging()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .tagging(to_tagging(uri, tags)?)
            .send()
            .await
            .map_err(|e| classify(uri, "put_tags", e))?;
        Ok(())
    }

    async fn delete_tags(&self, uri: &ObjectUri) -> Result<()> {
        self.client
            .delete_object_tagging()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .send()
            .await
            .map_err(|e| classify(uri, "delete_tags", e))?;
        Ok(())
    }
}
