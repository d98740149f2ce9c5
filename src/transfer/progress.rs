//! Progress events and sinks

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::s3::store::SentCallback;

/// Progress of one transfer, tagged with the file it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// File path for uploads from disk, file name for buffer uploads, key for downloads
    pub file_id: String,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

/// Receives progress events.
///
/// Called on the transfer's own task; implementations must return quickly.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn on_progress(&self, event: ProgressEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.send(event);
    }
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Forwards progress for one transfer, dropping anything that would move backwards
pub(crate) struct ProgressReporter {
    file_id: String,
    total: u64,
    last: AtomicU64,
    reported: AtomicBool,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    pub(crate) fn new(
        file_id: impl Into<String>,
        total: u64,
        sink: Arc<dyn ProgressSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            file_id: file_id.into(),
            total,
            last: AtomicU64::new(0),
            reported: AtomicBool::new(false),
            sink,
        })
    }

    /// Report cumulative bytes transferred
    pub(crate) fn report(&self, bytes: u64) {
        let bytes = bytes.min(self.total);
        let previous = self.last.fetch_max(bytes, Ordering::SeqCst);
        let first = !self.reported.swap(true, Ordering::SeqCst);
        if bytes > previous || (first && bytes == previous) {
            self.sink.on_progress(ProgressEvent {
                file_id: self.file_id.clone(),
                bytes_transferred: bytes,
                total_bytes: self.total,
            });
        }
    }

    /// Report completion unless the total was already reported
    pub(crate) fn finish(&self) {
        self.report(self.total);
    }

    /// Adapter for store calls that count bytes as they are sent
    pub(crate) fn sent_callback(self: &Arc<Self>) -> SentCallback {
        let reporter = Arc::clone(self);
        Arc::new(move |bytes| reporter.report(bytes))
    }
}
