//! Streaming relay: upstream text chunks to a chunked `text/plain` body.
//!
//! The response status is only committed once the first non-empty chunk has
//! arrived, so failures before that still become a JSON error response.
//! After that point a failure aborts the body instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::error::{Error, Result};
use crate::upstream::{GenerativeModel, TextStream};

/// Await `fut`, failing with [`Error::Timeout`] once `limit` elapses.
pub async fn bounded<T>(limit: Duration, fut: impl Future<Output = T>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(limit))
}

/// Open the upstream stream and build the streaming response.
///
/// Returns `Err` only for failures before the first chunk.
pub async fn relay_stream(
    model: Arc<dyn GenerativeModel>,
    prompt: &str,
    idle_timeout: Duration,
    request_id: String,
) -> Result<Response> {
    let mut upstream = bounded(idle_timeout, model.generate_stream(prompt)).await??;

    let first = loop {
        match bounded(idle_timeout, upstream.next()).await? {
            Some(Ok(text)) if text.is_empty() => continue,
            Some(Ok(text)) => break Some(text),
            Some(Err(e)) => return Err(e),
            None => break None,
        }
    };

    let relay = ChunkRelay {
        finished: first.is_none(),
        pending: first,
        upstream,
        idle_timeout,
        request_id,
        chunks: 0,
        bytes: 0,
    };
    if relay.finished {
        tracing::info!(request_id = %relay.request_id, "Upstream stream ended without text");
    }

    let headers = [
        (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
        (header::CACHE_CONTROL, "no-cache"),
    ];
    Ok((headers, Body::from_stream(relay.into_stream())).into_response())
}

/// Forward-only cursor over the upstream chunks of one response.
struct ChunkRelay {
    upstream: TextStream,
    pending: Option<String>,
    idle_timeout: Duration,
    request_id: String,
    chunks: usize,
    bytes: usize,
    finished: bool,
}

impl ChunkRelay {
    fn into_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        stream::unfold(self, |mut relay| async move {
            let item = relay.next_chunk().await?;
            Some((item, relay))
        })
    }

    async fn next_chunk(&mut self) -> Option<std::io::Result<Bytes>> {
        if self.finished {
            return None;
        }
        if let Some(text) = self.pending.take() {
            return Some(Ok(self.emit(text)));
        }

        loop {
            match tokio::time::timeout(self.idle_timeout, self.upstream.next()).await {
                Ok(Some(Ok(text))) if text.is_empty() => continue,
                Ok(Some(Ok(text))) => return Some(Ok(self.emit(text))),
                Ok(Some(Err(e))) => return Some(Err(self.abort(e))),
                Ok(None) => {
                    self.finished = true;
                    tracing::info!(
                        request_id = %self.request_id,
                        chunks = self.chunks,
                        bytes = self.bytes,
                        "Stream completed"
                    );
                    return None;
                }
                Err(_) => return Some(Err(self.abort(Error::Timeout(self.idle_timeout)))),
            }
        }
    }

    fn emit(&mut self, text: String) -> Bytes {
        self.chunks += 1;
        self.bytes += text.len();
        Bytes::from(text)
    }

    /// The status line is already sent: log, then fail the body so the
    /// connection is dropped without a terminating chunk.
    fn abort(&mut self, error: Error) -> std::io::Error {
        self.finished = true;
        tracing::error!(
            request_id = %self.request_id,
            error = %error,
            chunks = self.chunks,
            bytes = self.bytes,
            "Upstream stream failed mid-response, aborting connection"
        );
        std::io::Error::other(error)
    }
}

impl Drop for ChunkRelay {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                request_id = %self.request_id,
                chunks = self.chunks,
                bytes = self.bytes,
                "Client disconnected before stream completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_over(items: Vec<Result<String>>) -> ChunkRelay {
        ChunkRelay {
            upstream: stream::iter(items).boxed(),
            pending: None,
            idle_timeout: Duration::from_secs(5),
            request_id: "test".to_string(),
            chunks: 0,
            bytes: 0,
            finished: false,
        }
    }

    #[tokio::test]
    async fn test_empty_chunks_skipped_and_order_kept() {
        let relay = relay_over(vec![
            Ok("one ".to_string()),
            Ok(String::new()),
            Ok(" ".to_string()),
            Ok("two".to_string()),
        ]);
        let out: Vec<Bytes> = relay
            .into_stream()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(
            out,
            vec![Bytes::from("one "), Bytes::from(" "), Bytes::from("two")]
        );
    }

    #[tokio::test]
    async fn test_pending_chunk_emitted_first() {
        let mut relay = relay_over(vec![Ok("b".to_string())]);
        relay.pending = Some("a".to_string());
        let out: Vec<Bytes> = relay
            .into_stream()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec![Bytes::from("a"), Bytes::from("b")]);
    }

    #[tokio::test]
    async fn test_error_ends_body_with_io_error() {
        let relay = relay_over(vec![
            Ok("partial".to_string()),
            Err(Error::Upstream("reset".to_string())),
            Ok("never".to_string()),
        ]);
        let items: Vec<std::io::Result<Bytes>> = relay.into_stream().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &Bytes::from("partial"));
        assert!(items[1].is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_aborts_body() {
        let mut relay = relay_over(vec![]);
        relay.upstream = stream::pending().boxed();
        relay.pending = Some("first".to_string());
        let items: Vec<std::io::Result<Bytes>> = relay.into_stream().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        let err = items[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result = bounded(Duration::from_millis(10), std::future::pending::<()>()).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_value_through() {
        let value = bounded(Duration::from_secs(1), async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }
}
