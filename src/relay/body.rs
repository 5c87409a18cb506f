//! Streaming body plumbing.
//!
//! [`ByteStream`] is the one internal shape for payloads in either direction:
//! a lazy sequence of chunks that ends with `None`, reports failure with
//! `Err`, is only advanced when its consumer polls it, and is cancelled by
//! dropping it. Platform types (axum bodies, reqwest responses) are adapted to
//! it at the edges.

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Boxed stream of body chunks.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Adapt an inbound axum body into a [`ByteStream`].
pub fn from_axum_body(body: axum::body::Body) -> ByteStream {
    body.into_data_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        .boxed()
}

/// Adapt a reqwest response body into a [`ByteStream`].
pub fn from_reqwest(response: reqwest::Response) -> ByteStream {
    response
        .bytes_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        .boxed()
}

/// Put an already pulled chunk back in front of the rest of the stream.
pub fn prepend(first: Option<io::Result<Bytes>>, rest: ByteStream) -> ByteStream {
    futures::stream::iter(first).chain(rest).boxed()
}

/// Upstream body as handed to the caller.
///
/// Hyper only polls the next chunk once the previous one has been written to
/// the socket, so at most one chunk is held here at a time. Dropping the body
/// (caller disconnect) drops the upstream stream and with it the upstream
/// connection.
pub struct RelayBody {
    inner: ByteStream,
    target: String,
    bytes: u64,
    finished: bool,
}

impl RelayBody {
    pub fn new(inner: ByteStream, target: impl Into<String>) -> Self {
        Self {
            inner,
            target: target.into(),
            bytes: 0,
            finished: false,
        }
    }

    /// Bytes handed to the caller so far.
    pub fn bytes_relayed(&self) -> u64 {
        self.bytes
    }
}

impl Stream for RelayBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                tracing::warn!(
                    target_url = %this.target,
                    bytes = this.bytes,
                    error = %e,
                    "Upstream stream failed mid-body; response truncated"
                );
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                tracing::debug!(target_url = %this.target, bytes = this.bytes, "Relay complete");
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                target_url = %self.target,
                bytes = self.bytes,
                "Caller went away before upstream finished; releasing upstream"
            );
        }
    }
}

/// Outbound request body for reqwest.
///
/// The boxed stream is `Send` but not `Sync`; the mutex is only ever reached
/// through `get_mut`, so it never actually locks.
pub struct OutboundBody(std::sync::Mutex<ByteStream>);

impl OutboundBody {
    pub fn new(inner: ByteStream) -> Self {
        Self(std::sync::Mutex::new(inner))
    }
}

impl Stream for OutboundBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let inner = self.0.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.poll_next_unpin(cx)
    }
}
