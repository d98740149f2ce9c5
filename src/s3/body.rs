//! Request body that reports bytes as the transport pulls them

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::s3::store::SentCallback;

/// Size of each data frame handed to the transport
const FRAME_SIZE: usize = 64 * 1024;

/// An in-memory body split into frames, invoking a callback with the
/// cumulative byte count as each frame is polled
pub struct CountingBody {
    data: Bytes,
    offset: usize,
    on_sent: Option<SentCallback>,
}

impl CountingBody {
    pub fn new(data: Bytes, on_sent: Option<SentCallback>) -> Self {
        Self {
            data,
            offset: 0,
            on_sent,
        }
    }
}

impl Body for CountingBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if self.offset >= self.data.len() {
            return Poll::Ready(None);
        }

        let end = (self.offset + FRAME_SIZE).min(self.data.len());
        let frame = self.data.slice(self.offset..end);
        self.offset = end;

        if let Some(on_sent) = &self.on_sent {
            on_sent(end as u64);
        }

        Poll::Ready(Some(Ok(Frame::data(frame))))
    }

    fn is_end_stream(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact((self.data.len() - self.offset) as u64)
    }
}
