//! Multipart upload coordinator
//!
//! One [`MultipartSession`] drives one upload through
//! `Initiated -> PartsUploading -> Completing -> Committed`, or
//! `Aborting -> Aborted` on any failure after the session was created.
//! A session never outlives the call that created it.

use tokio_util::sync::CancellationToken;

use crate::error::{CleanupError, Result, TransferError};
use crate::s3::store::{CompletedPart, ObjectStore};
use crate::s3::types::TransferResult;
use crate::transfer::payload::Payload;
use crate::transfer::progress::ProgressReporter;
use crate::transfer::strategy::PartPlan;

/// Lifecycle of a multipart session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initiated,
    PartsUploading,
    Completing,
    Committed,
    Aborting,
    Aborted,
}

pub(crate) struct MultipartSession<'a> {
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    key: &'a str,
    upload_id: String,
    plan: PartPlan,
    completed_parts: Vec<CompletedPart>,
    state: SessionState,
}

impl<'a> MultipartSession<'a> {
    fn transition(&mut self, next: SessionState) {
        tracing::debug!(
            "Multipart upload {} ({}): {:?} -> {:?}",
            self.upload_id,
            self.key,
            self.state,
            next
        );
        self.state = next;
    }

    /// Upload every part in ascending order, then complete
    async fn upload_parts(
        &mut self,
        payload: &mut Payload,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.transition(SessionState::PartsUploading);

        let mut uploaded: u64 = 0;
        for part in self.plan.parts() {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let body = payload.read_range(part.offset, part.len).await?;

            let e_tag = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                result = self.store.upload_part(
                    self.bucket,
                    self.key,
                    &self.upload_id,
                    part.part_number,
                    body,
                ) => result.map_err(|e| TransferError::store("UploadPart", e))?,
            };

            tracing::debug!(
                "Uploaded part {}/{} of {} ({} bytes)",
                part.part_number,
                self.plan.part_count,
                self.key,
                part.len
            );

            self.completed_parts.push(CompletedPart {
                part_number: part.part_number,
                e_tag,
            });

            uploaded += part.len;
            reporter.report(uploaded);
        }

        // Completion is not raced against cancellation: once submitted the
        // object may already be committed.
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        self.transition(SessionState::Completing);
        self.store
            .complete_multipart_upload(
                self.bucket,
                self.key,
                &self.upload_id,
                &self.completed_parts,
            )
            .await
            .map_err(|e| TransferError::store("CompleteMultipartUpload", e))?;

        self.transition(SessionState::Committed);
        Ok(())
    }

    /// Release the server-side session. Failures are logged, never returned.
    async fn abort(&mut self) {
        self.transition(SessionState::Aborting);

        if let Err(source) = self
            .store
            .abort_multipart_upload(self.bucket, self.key, &self.upload_id)
            .await
        {
            let err = CleanupError {
                key: self.key.to_string(),
                upload_id: self.upload_id.clone(),
                source,
            };
            tracing::error!("{}", err);
        }

        self.transition(SessionState::Aborted);
    }
}

/// Upload a payload through a multipart session.
///
/// A session that was created is always completed or aborted before this
/// returns; on failure the original error is returned even if the abort fails.
pub(crate) async fn upload_multipart(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    payload: &mut Payload,
    plan: PartPlan,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
) -> Result<TransferResult> {
    if cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }

    // Not raced against cancellation so an upload id is never lost
    let upload_id = store
        .create_multipart_upload(bucket, key)
        .await
        .map_err(|e| TransferError::store("CreateMultipartUpload", e))?;

    tracing::info!(
        "Started multipart upload {} for {} ({} bytes, {} parts)",
        upload_id,
        key,
        plan.total_size,
        plan.part_count
    );

    let mut session = MultipartSession {
        store,
        bucket,
        key,
        upload_id,
        plan,
        completed_parts: Vec::with_capacity(plan.part_count as usize),
        state: SessionState::Initiated,
    };

    match session.upload_parts(payload, reporter, cancel).await {
        Ok(()) => {
            tracing::info!("Completed multipart upload of {}", key);
            Ok(TransferResult {
                key: key.to_string(),
                size: plan.total_size,
            })
        }
        Err(err) => {
            tracing::warn!(
                "Multipart upload {} for {} failed in {:?}: {}",
                session.upload_id,
                key,
                session.state,
                err
            );
            session.abort().await;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::memory::{FailPoint, MemoryStore, StoreCall};
    use crate::transfer::progress::{NoProgress, ProgressEvent, ProgressSink};
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn buffer(len: usize) -> Payload {
        Payload::Buffer(Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>()))
    }

    fn reporter(total: u64) -> Arc<ProgressReporter> {
        ProgressReporter::new("test", total, Arc::new(NoProgress))
    }

    #[tokio::test]
    async fn test_parts_uploaded_sequentially_and_completed() {
        let store = MemoryStore::new();
        let mut payload = buffer(25);
        let plan = PartPlan::new(25, 10).unwrap();

        let result = upload_multipart(
            &store,
            "b",
            "big.bin",
            &mut payload,
            plan,
            &reporter(25),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.size, 25);
        let calls = store.calls();
        let part_calls: Vec<(i32, u64)> = calls
            .iter()
            .filter_map(|c| match c {
                StoreCall::UploadPart {
                    part_number,
                    content_length,
                    ..
                } => Some((*part_number, *content_length)),
                _ => None,
            })
            .collect();
        assert_eq!(part_calls, vec![(1, 10), (2, 10), (3, 5)]);

        match calls.last().unwrap() {
            StoreCall::CompleteMultipartUpload { parts, .. } => {
                let numbers: Vec<i32> = parts.iter().map(|p| p.part_number).collect();
                assert_eq!(numbers, vec![1, 2, 3]);
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(store.object("b", "big.bin").unwrap().len(), 25);
        assert_eq!(store.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_part_failure_aborts_and_returns_original_error() {
        let store = MemoryStore::new();
        store.fail_on(FailPoint::UploadPart(2));
        store.fail_on(FailPoint::AbortMultipartUpload);

        let err = upload_multipart(
            &store,
            "b",
            "big.bin",
            &mut buffer(25),
            PartPlan::new(25, 10).unwrap(),
            &reporter(25),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        match err {
            TransferError::Store { operation, .. } => assert_eq!(operation, "UploadPart"),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(
            store.calls().last(),
            Some(StoreCall::AbortMultipartUpload { .. })
        ));
        assert!(store.object("b", "big.bin").is_none());
    }

    #[tokio::test]
    async fn test_create_failure_is_not_aborted() {
        let store = MemoryStore::new();
        store.fail_on(FailPoint::CreateMultipartUpload);

        let err = upload_multipart(
            &store,
            "b",
            "big.bin",
            &mut buffer(25),
            PartPlan::new(25, 10).unwrap(),
            &reporter(25),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::Store { operation: "CreateMultipartUpload", .. }));
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_complete_failure_aborts() {
        let store = MemoryStore::new();
        store.fail_on(FailPoint::CompleteMultipartUpload);

        let err = upload_multipart(
            &store,
            "b",
            "big.bin",
            &mut buffer(25),
            PartPlan::new(25, 10).unwrap(),
            &reporter(25),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::Store { operation: "CompleteMultipartUpload", .. }));
        assert_eq!(store.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_during_parts_aborts() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();

        // Cancel as soon as the first part is acknowledged
        let trigger = cancel.clone();
        let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::default();
        let collected = events.clone();
        let sink: Arc<dyn ProgressSink> = Arc::new(move |e: ProgressEvent| {
            collected.lock().push(e);
            trigger.cancel();
        });
        let reporter = ProgressReporter::new("test", 25, sink);

        let err = upload_multipart(
            &store,
            "b",
            "big.bin",
            &mut buffer(25),
            PartPlan::new(25, 10).unwrap(),
            &reporter,
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(events.lock().len(), 1);
        assert!(matches!(
            store.calls().last(),
            Some(StoreCall::AbortMultipartUpload { .. })
        ));
        assert_eq!(store.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_progress_is_cumulative_per_part() {
        let store = MemoryStore::new();
        let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::default();
        let collected = events.clone();
        let sink: Arc<dyn ProgressSink> =
            Arc::new(move |e: ProgressEvent| collected.lock().push(e));

        upload_multipart(
            &store,
            "b",
            "big.bin",
            &mut buffer(25),
            PartPlan::new(25, 10).unwrap(),
            &ProgressReporter::new("big.bin", 25, sink),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let values: Vec<u64> = events.lock().iter().map(|e| e.bytes_transferred).collect();
        assert_eq!(values, vec![10, 20, 25]);
    }
}
