//! In-memory object store
//!
//! Emulates the parts of S3 the engine relies on: delimiter listings with
//! continuation tokens, multipart sessions, batch deletes. Every call is
//! recorded, and individual operations can be made to fail, so callers can
//! exercise the engine offline.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::{StoreError, TransferError};
use crate::s3::connection::ConnectionDescriptor;
use crate::s3::store::{
    BatchDeleteOutcome, CompletedPart, ListPage, ListRequest, ListedObject, ObjectBody,
    ObjectStore, SentCallback, StoreFactory,
};

/// A call observed by the [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    ListObjects {
        prefix: String,
        delimiter: Option<String>,
        continuation_token: Option<String>,
    },
    PutObject {
        key: String,
        content_length: u64,
    },
    GetObject {
        key: String,
    },
    DeleteObject {
        key: String,
    },
    DeleteObjects {
        keys: Vec<String>,
    },
    CreateMultipartUpload {
        key: String,
    },
    UploadPart {
        upload_id: String,
        part_number: i32,
        content_length: u64,
    },
    CompleteMultipartUpload {
        upload_id: String,
        parts: Vec<CompletedPart>,
    },
    AbortMultipartUpload {
        upload_id: String,
    },
}

/// Operation a failure can be injected into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailPoint {
    ListObjects,
    PutObject,
    GetObject,
    /// Object bodies fail with an I/O error after half their bytes
    GetObjectBody,
    /// Object bodies end after half their bytes while announcing the full length
    ShortBody,
    DeleteObject,
    DeleteObjects,
    CreateMultipartUpload,
    /// Fail the upload of this part number
    UploadPart(i32),
    CompleteMultipartUpload,
    AbortMultipartUpload,
    /// Report this key as failed in batch deletes
    BatchDeleteKey(String),
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct PendingUpload {
    key: String,
    parts: BTreeMap<i32, (String, Bytes)>,
}

#[derive(Debug)]
struct State {
    buckets: HashMap<String, BTreeMap<String, StoredObject>>,
    uploads: HashMap<String, PendingUpload>,
    calls: Vec<StoreCall>,
    failures: HashSet<FailPoint>,
    next_upload_id: u64,
    page_size: Option<usize>,
}

enum Entry {
    Object(String),
    Prefix(String),
}

impl Entry {
    fn name(&self) -> &str {
        match self {
            Entry::Object(name) | Entry::Prefix(name) => name,
        }
    }
}

/// Thread-safe in-memory store; clones share state
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                buckets: HashMap::new(),
                uploads: HashMap::new(),
                calls: Vec::new(),
                failures: HashSet::new(),
                next_upload_id: 1,
                page_size: None,
            })),
        }
    }

    /// Cap every listing page at `page_size` entries regardless of the request
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state.lock().page_size = Some(page_size.max(1));
        self
    }

    /// Seed an object directly, without recording a call
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        let mut state = self.state.lock();
        state.buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                last_modified: Utc::now(),
            },
        );
    }

    /// Read back an object's content
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let state = self.state.lock();
        state
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|o| o.data.clone())
    }

    /// All keys in a bucket, in order
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Make the given operation fail until cleared
    pub fn fail_on(&self, point: FailPoint) {
        self.state.lock().failures.insert(point);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Calls observed so far
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Multipart sessions neither completed nor aborted
    pub fn pending_uploads(&self) -> usize {
        self.state.lock().uploads.len()
    }

    fn record(&self, call: StoreCall, point: FailPoint) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.failures.contains(&point) {
            return Err(StoreError::Service {
                code: Some("InjectedFailure".to_string()),
                message: format!("injected failure for {:?}", point),
            });
        }
        Ok(())
    }

    fn list_entries(
        objects: &BTreeMap<String, StoredObject>,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Vec<Entry> {
        let mut entries: Vec<Entry> = Vec::new();
        for key in objects.keys().filter(|k| k.starts_with(prefix)) {
            let rest = &key[prefix.len()..];
            let common = delimiter
                .filter(|d| !d.is_empty())
                .and_then(|d| rest.find(d).map(|idx| &key[..prefix.len() + idx + d.len()]));

            match common {
                Some(common) => {
                    let duplicate =
                        matches!(entries.last(), Some(Entry::Prefix(p)) if p.as_str() == common);
                    if !duplicate {
                        entries.push(Entry::Prefix(common.to_string()));
                    }
                }
                None => entries.push(Entry::Object(key.clone())),
            }
        }
        entries
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_objects(&self, request: ListRequest<'_>) -> Result<ListPage, StoreError> {
        self.record(
            StoreCall::ListObjects {
                prefix: request.prefix.to_string(),
                delimiter: request.delimiter.map(|d| d.to_string()),
                continuation_token: request.continuation_token.map(|t| t.to_string()),
            },
            FailPoint::ListObjects,
        )?;

        let state = self.state.lock();
        let Some(objects) = state.buckets.get(request.bucket) else {
            return Ok(ListPage::default());
        };

        let mut page_size = request.max_keys.max(1) as usize;
        if let Some(limit) = state.page_size {
            page_size = page_size.min(limit);
        }

        let entries = Self::list_entries(objects, request.prefix, request.delimiter);
        let remaining: Vec<&Entry> = entries
            .iter()
            .filter(|e| match request.continuation_token {
                Some(token) => e.name() > token,
                None => true,
            })
            .collect();

        let truncated = remaining.len() > page_size;
        let page = &remaining[..remaining.len().min(page_size)];

        let mut result = ListPage::default();
        for entry in page {
            match entry {
                Entry::Object(key) => {
                    let stored = &objects[key];
                    result.objects.push(ListedObject {
                        key: key.clone(),
                        size: stored.data.len() as u64,
                        last_modified: Some(stored.last_modified),
                    });
                }
                Entry::Prefix(prefix) => result.common_prefixes.push(prefix.clone()),
            }
        }
        if truncated {
            result.next_continuation_token = page.last().map(|e| e.name().to_string());
        }

        Ok(result)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        on_sent: Option<SentCallback>,
    ) -> Result<(), StoreError> {
        self.record(
            StoreCall::PutObject {
                key: key.to_string(),
                content_length: body.len() as u64,
            },
            FailPoint::PutObject,
        )?;

        if let Some(on_sent) = on_sent {
            on_sent(body.len() as u64);
        }
        self.insert(bucket, key, body);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody, StoreError> {
        self.record(
            StoreCall::GetObject {
                key: key.to_string(),
            },
            FailPoint::GetObject,
        )?;

        let data = self.object(bucket, key).ok_or_else(|| StoreError::Service {
            code: Some("NoSuchKey".to_string()),
            message: format!("the specified key does not exist: {}", key),
        })?;

        let content_length = Some(data.len() as u64);
        let half = data.slice(..data.len() / 2);
        let (body_error, short_body) = {
            let state = self.state.lock();
            (
                state.failures.contains(&FailPoint::GetObjectBody),
                state.failures.contains(&FailPoint::ShortBody),
            )
        };

        let reader: Pin<Box<dyn AsyncRead + Send>> = if body_error {
            Box::pin(FailingReader { data: half })
        } else if short_body {
            Box::pin(io::Cursor::new(half))
        } else {
            Box::pin(io::Cursor::new(data))
        };

        Ok(ObjectBody {
            content_length,
            reader,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.record(
            StoreCall::DeleteObject {
                key: key.to_string(),
            },
            FailPoint::DeleteObject,
        )?;

        let mut state = self.state.lock();
        if let Some(objects) = state.buckets.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutcome, StoreError> {
        self.record(
            StoreCall::DeleteObjects {
                keys: keys.to_vec(),
            },
            FailPoint::DeleteObjects,
        )?;

        let mut state = self.state.lock();
        let rejected: HashSet<String> = state
            .failures
            .iter()
            .filter_map(|f| match f {
                FailPoint::BatchDeleteKey(key) => Some(key.clone()),
                _ => None,
            })
            .collect();

        let mut outcome = BatchDeleteOutcome::default();
        let objects = state.buckets.entry(bucket.to_string()).or_default();
        for key in keys {
            if rejected.contains(key) {
                outcome.failed += 1;
            } else {
                objects.remove(key);
                outcome.deleted += 1;
            }
        }
        Ok(outcome)
    }

    async fn create_multipart_upload(
        &self,
        _bucket: &str,
        key: &str,
    ) -> Result<String, StoreError> {
        self.record(
            StoreCall::CreateMultipartUpload {
                key: key.to_string(),
            },
            FailPoint::CreateMultipartUpload,
        )?;

        let mut state = self.state.lock();
        let upload_id = format!("upload-{}", state.next_upload_id);
        state.next_upload_id += 1;
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String, StoreError> {
        self.record(
            StoreCall::UploadPart {
                upload_id: upload_id.to_string(),
                part_number,
                content_length: body.len() as u64,
            },
            FailPoint::UploadPart(part_number),
        )?;

        let mut state = self.state.lock();
        let upload = state.uploads.get_mut(upload_id).ok_or_else(|| no_such_upload(upload_id))?;
        let e_tag = format!("\"{}-{}\"", upload_id, part_number);
        upload.parts.insert(part_number, (e_tag.clone(), body));
        Ok(e_tag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        _key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError> {
        self.record(
            StoreCall::CompleteMultipartUpload {
                upload_id: upload_id.to_string(),
                parts: parts.to_vec(),
            },
            FailPoint::CompleteMultipartUpload,
        )?;

        let mut state = self.state.lock();
        let upload = state.uploads.get(upload_id).ok_or_else(|| no_such_upload(upload_id))?;

        // Parts must be ascending and match the ETags handed out
        let mut data = BytesMut::new();
        let mut previous = 0;
        for part in parts {
            if part.part_number <= previous {
                return Err(StoreError::Service {
                    code: Some("InvalidPartOrder".to_string()),
                    message: "parts must be listed in ascending order".to_string(),
                });
            }
            previous = part.part_number;
            match upload.parts.get(&part.part_number) {
                Some((e_tag, bytes)) if *e_tag == part.e_tag => data.extend_from_slice(bytes),
                _ => {
                    return Err(StoreError::Service {
                        code: Some("InvalidPart".to_string()),
                        message: format!("part {} not found or ETag mismatch", part.part_number),
                    })
                }
            }
        }

        let Some(upload) = state.uploads.remove(upload_id) else {
            return Err(no_such_upload(upload_id));
        };
        state.buckets.entry(bucket.to_string()).or_default().insert(
            upload.key,
            StoredObject {
                data: data.freeze(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError> {
        self.record(
            StoreCall::AbortMultipartUpload {
                upload_id: upload_id.to_string(),
            },
            FailPoint::AbortMultipartUpload,
        )?;

        self.state.lock().uploads.remove(upload_id);
        Ok(())
    }
}

/// Yields its bytes, then fails every read
struct FailingReader {
    data: Bytes,
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.data.is_empty() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset while reading body",
            )));
        }
        let n = self.data.len().min(buf.remaining());
        let chunk = self.data.split_to(n);
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

fn no_such_upload(upload_id: &str) -> StoreError {
    StoreError::Service {
        code: Some("NoSuchUpload".to_string()),
        message: format!("upload {} does not exist", upload_id),
    }
}

impl StoreFactory for MemoryStore {
    fn create(
        &self,
        _descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn ObjectStore>, TransferError> {
        Ok(Arc::new(self.clone()))
    }
}
