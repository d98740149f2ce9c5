//! Single-request uploads for small payloads

use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TransferError};
use crate::s3::store::ObjectStore;
use crate::s3::types::TransferResult;
use crate::transfer::progress::ProgressReporter;

/// Upload `payload` with one put request carrying its exact length.
///
/// Progress is measured from the request body as the transport consumes it.
pub(crate) async fn put_small(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    payload: Bytes,
    reporter: &Arc<ProgressReporter>,
    cancel: &CancellationToken,
) -> Result<TransferResult> {
    let size = payload.len() as u64;

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
        result = store.put_object(bucket, key, payload, Some(reporter.sent_callback())) => {
            result.map_err(|e| TransferError::store("PutObject", e))?
        }
    }

    reporter.finish();
    tracing::info!("Uploaded {} ({} bytes)", key, size);

    Ok(TransferResult {
        key: key.to_string(),
        size,
    })
}
