use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::StatusCode;
use http_body::{Body, Frame, SizeHint};

/// Status, size and latency accounting for one response.
///
/// Latency runs from creation to the most recent activity, where both the
/// header and every body write count as activity. A bodiless response
/// therefore reports its time-to-header and a streamed one its time to the
/// last byte.
#[derive(Debug, Clone, Copy)]
pub struct ResponseObserver {
    start: Instant,
    status: Option<StatusCode>,
    size: u64,
    last_activity: Option<Instant>,
}

impl Default for ResponseObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseObserver {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(start: Instant) -> Self {
        Self {
            start,
            status: None,
            size: 0,
            last_activity: None,
        }
    }

    pub fn write_header(&mut self, status: StatusCode) {
        self.status = Some(status);
        self.touch();
    }

    /// Account for `len` body bytes; implies `200 OK` if no header was set.
    pub fn record_write(&mut self, len: usize) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.size += len as u64;
        self.touch();
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Body bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn latency(&self) -> Duration {
        self.last_activity
            .map(|t| t.saturating_duration_since(self.start))
            .unwrap_or_default()
    }

    pub(crate) fn has_status(&self) -> bool {
        self.status.is_some()
    }

    fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
    }
}

/// Access to the observer carried alongside a body.
pub trait Observe {
    fn observer_mut(&mut self) -> &mut ResponseObserver;
}

impl Observe for ResponseObserver {
    fn observer_mut(&mut self) -> &mut ResponseObserver {
        self
    }
}

/// Body decorator that forwards every frame untouched and accounts data
/// frames into an observer.
///
/// `O` owns the observer; the middleware uses a guard that records the
/// request once the body is dropped.
pub struct ObservedBody<B, O> {
    inner: B,
    observer: O,
}

impl<B, O> ObservedBody<B, O> {
    pub fn new(inner: B, observer: O) -> Self {
        Self { inner, observer }
    }
}

impl<B, O> Body for ObservedBody<B, O>
where
    B: Body<Data = Bytes> + Unpin,
    O: Observe + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled {
            if let Some(data) = frame.data_ref() {
                this.observer.observer_mut().record_write(data.len());
            }
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
