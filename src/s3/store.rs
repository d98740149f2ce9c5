//! Object store abstraction
//!
//! [`ObjectStore`] is the protocol surface the engine drives. [`crate::s3::S3Store`]
//! implements it on top of aws-sdk-s3; [`crate::s3::MemoryStore`] implements it
//! in memory.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::error::{StoreError, TransferError};
use crate::s3::connection::ConnectionDescriptor;

/// Invoked with the cumulative number of body bytes handed to the transport
pub type SentCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Parameters of one listing request
#[derive(Debug, Clone, Copy)]
pub struct ListRequest<'a> {
    pub bucket: &'a str,
    pub prefix: &'a str,
    pub delimiter: Option<&'a str>,
    pub continuation_token: Option<&'a str>,
    pub max_keys: i32,
}

/// An object as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of listing results
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    pub common_prefixes: Vec<String>,
    pub next_continuation_token: Option<String>,
}

/// A streaming object body
pub struct ObjectBody {
    pub content_length: Option<u64>,
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// A part accepted by the store, as submitted on completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub e_tag: String,
}

/// Result of a batch delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchDeleteOutcome {
    /// Keys the store confirmed deleted
    pub deleted: usize,
    /// Keys the store reported as failed
    pub failed: usize,
}

/// Low-level object store operations
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of objects
    async fn list_objects(&self, request: ListRequest<'_>) -> Result<ListPage, StoreError>;

    /// Upload a whole object in one request with an exact content length
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        on_sent: Option<SentCallback>,
    ) -> Result<(), StoreError>;

    /// Open an object body as a byte stream
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError>;

    /// Delete one object; deleting a missing key succeeds
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Delete up to 1000 keys in one request
    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StoreError>;

    /// Start a multipart session and return its upload id
    async fn create_multipart_upload(&self, bucket: &str, key: &str)
        -> Result<String, StoreError>;

    /// Upload one part and return its ETag
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String, StoreError>;

    /// Assemble the object from the given parts
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError>;

    /// Discard a multipart session and its uploaded parts
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError>;
}

/// Builds a store bound to one connection.
///
/// Construction is pure: no network traffic happens until an operation runs.
pub trait StoreFactory: Send + Sync {
    fn create(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn ObjectStore>, TransferError>;
}
