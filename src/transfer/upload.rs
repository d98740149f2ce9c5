//! Uploads from disk and from memory

use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransferError};
use crate::s3::connection::ConnectionResolver;
use crate::s3::types::{object_key, TransferResult};
use crate::transfer::multipart::upload_multipart;
use crate::transfer::payload::Payload;
use crate::transfer::progress::{ProgressReporter, ProgressSink};
use crate::transfer::single::put_small;
use crate::transfer::strategy::TransferStrategy;
use crate::transfer::{Connection, TransferEngine};

/// Upload of a file on disk
#[derive(Debug, Clone, Default)]
pub struct UploadFile {
    /// Key prefix, used verbatim (normally ends in `/` or is empty)
    pub prefix: String,
    pub path: PathBuf,
    /// Object name override; empty or `None` uses the file's own name
    pub file_name: Option<String>,
}

/// Upload of an in-memory buffer
#[derive(Debug, Clone, Default)]
pub struct UploadBuffer {
    pub prefix: String,
    pub file_name: String,
    pub data: Bytes,
}

impl TransferEngine {
    /// Upload a file, switching to multipart above the configured threshold.
    ///
    /// Progress events are tagged with the file path.
    pub async fn upload_file(
        &self,
        resolver: &dyn ConnectionResolver,
        connection_id: &str,
        request: &UploadFile,
        progress: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<TransferResult> {
        let conn = self.connect(resolver, connection_id)?;

        if request.path.as_os_str().is_empty() {
            return Err(TransferError::Input("file path is empty".to_string()));
        }

        let file_name = match request.file_name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => request
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    TransferError::Input(format!(
                        "cannot derive a file name from {}",
                        request.path.display()
                    ))
                })?,
        };

        let key = object_key(&request.prefix, &file_name);
        let payload = Payload::open(&request.path).await?;
        let file_id = request.path.display().to_string();

        self.upload_payload(&conn, &key, payload, file_id, progress, cancel)
            .await
    }

    /// Upload an in-memory buffer, switching to multipart above the configured threshold.
    ///
    /// Progress events are tagged with the file name.
    pub async fn upload_buffer(
        &self,
        resolver: &dyn ConnectionResolver,
        connection_id: &str,
        request: UploadBuffer,
        progress: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<TransferResult> {
        let conn = self.connect(resolver, connection_id)?;

        if request.file_name.is_empty() {
            return Err(TransferError::Input("file name is empty".to_string()));
        }

        let key = object_key(&request.prefix, &request.file_name);
        let payload = Payload::Buffer(request.data);

        self.upload_payload(&conn, &key, payload, request.file_name, progress, cancel)
            .await
    }

    async fn upload_payload(
        &self,
        conn: &Connection,
        key: &str,
        mut payload: Payload,
        file_id: String,
        progress: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<TransferResult> {
        let size = payload.size();
        let strategy = TransferStrategy::select(size, &self.config)?;
        let reporter = ProgressReporter::new(file_id, size, progress);

        tracing::debug!("Uploading {} ({} bytes) as {:?}", key, size, strategy);

        match strategy {
            TransferStrategy::SingleShot => {
                let body = payload.read_all().await?;
                put_small(conn.store.as_ref(), &conn.bucket, key, body, &reporter, cancel).await
            }
            TransferStrategy::Multipart(plan) => {
                upload_multipart(
                    conn.store.as_ref(),
                    &conn.bucket,
                    key,
                    &mut payload,
                    plan,
                    &reporter,
                    cancel,
                )
                .await
            }
        }
    }
}
