//! Deletes, folder markers and downloads

use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreError, TransferError};
use crate::s3::connection::ConnectionResolver;
use crate::s3::store::ObjectBody;
use crate::s3::types::{
    is_folder_marker, CreateFolderResult, DeleteFolderResult, DeleteObjectResult, DownloadResult,
};
use crate::transfer::progress::{ProgressReporter, ProgressSink};
use crate::transfer::{cancellable, TransferEngine};

/// Keys per batch delete request (S3 limit)
const MAX_BATCH_DELETE: usize = 1000;

impl TransferEngine {
    /// Delete one object. Deleting a missing key succeeds.
    pub async fn delete_object(
        &self,
        resolver: &dyn ConnectionResolver,
        connection_id: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteObjectResult> {
        let conn = self.connect(resolver, connection_id)?;

        if key.is_empty() {
            return Err(TransferError::Input("object key is empty".to_string()));
        }

        cancellable(cancel, async {
            conn.store
                .delete_object(&conn.bucket, key)
                .await
                .map_err(|e| TransferError::store("DeleteObject", e))
        })
        .await?;

        tracing::info!("Deleted {}", key);
        Ok(DeleteObjectResult {
            key: key.to_string(),
        })
    }

    /// Delete every object under `prefix`.
    ///
    /// Not transactional: the result counts only keys the store confirmed.
    pub async fn delete_folder(
        &self,
        resolver: &dyn ConnectionResolver,
        connection_id: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteFolderResult> {
        let conn = self.connect(resolver, connection_id)?;

        // An empty prefix would match the whole bucket
        if prefix.is_empty() {
            return Err(TransferError::Input("folder prefix is empty".to_string()));
        }

        let keys = self.collect_keys(&conn, prefix, cancel).await?;
        if keys.is_empty() {
            tracing::debug!("Nothing to delete under {}", prefix);
            return Ok(DeleteFolderResult { deleted: 0 });
        }

        let mut deleted = 0;
        let mut failed = 0;
        for batch in keys.chunks(MAX_BATCH_DELETE) {
            let outcome = cancellable(cancel, async {
                conn.store
                    .delete_objects(&conn.bucket, batch)
                    .await
                    .map_err(|e| TransferError::store("DeleteObjects", e))
            })
            .await?;
            deleted += outcome.deleted;
            failed += outcome.failed;
        }

        if failed > 0 {
            tracing::warn!(
                "Deleting {} left {} of {} object(s) in place",
                prefix,
                failed,
                keys.len()
            );
        }
        tracing::info!("Deleted {} object(s) under {}", deleted, prefix);

        Ok(DeleteFolderResult { deleted })
    }

    /// Create an empty-directory marker: a zero-byte object whose key ends in `/`
    pub async fn create_folder(
        &self,
        resolver: &dyn ConnectionResolver,
        connection_id: &str,
        folder_key: &str,
        cancel: &CancellationToken,
    ) -> Result<CreateFolderResult> {
        let conn = self.connect(resolver, connection_id)?;

        if folder_key.trim_end_matches('/').is_empty() {
            return Err(TransferError::Input("folder key is empty".to_string()));
        }

        let folder_key = if is_folder_marker(folder_key) {
            folder_key.to_string()
        } else {
            format!("{}/", folder_key)
        };

        cancellable(cancel, async {
            conn.store
                .put_object(&conn.bucket, &folder_key, Bytes::new(), None)
                .await
                .map_err(|e| TransferError::store("PutObject", e))
        })
        .await?;

        tracing::info!("Created folder {}", folder_key);
        Ok(CreateFolderResult { folder_key })
    }

    /// Stream an object to `save_path`.
    ///
    /// Resolves once every byte is flushed to disk. A partial file is removed
    /// on failure or cancellation. Progress events are tagged with the key.
    pub async fn download_file(
        &self,
        resolver: &dyn ConnectionResolver,
        connection_id: &str,
        key: &str,
        save_path: &Path,
        progress: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult> {
        let conn = self.connect(resolver, connection_id)?;

        if key.is_empty() || is_folder_marker(key) {
            return Err(TransferError::Input(format!(
                "'{}' is not a downloadable object key",
                key
            )));
        }
        if save_path.as_os_str().is_empty() {
            return Err(TransferError::Input("save path is empty".to_string()));
        }

        let body = cancellable(cancel, async {
            conn.store
                .get_object(&conn.bucket, key)
                .await
                .map_err(|e| TransferError::store("GetObject", e))
        })
        .await?;

        let reporter = body
            .content_length
            .map(|total| ProgressReporter::new(key, total, progress));

        // Only a file opened here is removed on failure
        let file = File::create(save_path)
            .await
            .map_err(|e| TransferError::io(format!("create {}", save_path.display()), e))?;

        match self
            .write_body(key, body, file, save_path, reporter.as_deref(), cancel)
            .await
        {
            Ok(size) => {
                tracing::info!("Downloaded {} to {:?} ({} bytes)", key, save_path, size);
                Ok(DownloadResult {
                    key: key.to_string(),
                    save_path: save_path.display().to_string(),
                    size,
                })
            }
            Err(err) => {
                if let Err(e) = tokio::fs::remove_file(save_path).await {
                    tracing::debug!("Could not remove partial file {:?}: {}", save_path, e);
                }
                Err(err)
            }
        }
    }

    async fn write_body(
        &self,
        key: &str,
        mut body: ObjectBody,
        file: File,
        save_path: &Path,
        reporter: Option<&ProgressReporter>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; self.config.download_buffer_size];
        let mut written: u64 = 0;

        loop {
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                read = body.reader.read(&mut buffer) => read.map_err(|e| {
                    TransferError::store("GetObject", StoreError::Body(e.to_string()))
                })?,
            };
            if n == 0 {
                break;
            }

            writer
                .write_all(&buffer[..n])
                .await
                .map_err(|e| TransferError::io(format!("write {}", save_path.display()), e))?;
            written += n as u64;

            if let Some(reporter) = reporter {
                reporter.report(written);
            }
        }

        if let Some(expected) = body.content_length {
            if written != expected {
                return Err(TransferError::store(
                    "GetObject",
                    StoreError::Body(format!(
                        "{} ended after {} of {} bytes",
                        key, written, expected
                    )),
                ));
            }
        }

        writer
            .flush()
            .await
            .map_err(|e| TransferError::io(format!("flush {}", save_path.display()), e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| TransferError::io(format!("sync {}", save_path.display()), e))?;

        if let Some(reporter) = reporter {
            reporter.finish();
        }

        Ok(written)
    }
}
