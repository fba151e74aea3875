//! SSE decoding for `streamGenerateContent?alt=sse` responses.
//!
//! [`SseDecoder`] reassembles `data:` payloads across arbitrary chunk
//! boundaries. [`decode_sse_text_stream`] turns an upstream byte stream into
//! the [`TextStream`] the relay consumes.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};

use super::gemini::GenerateContentResponse;
use super::TextStream;
use crate::error::{Error, Result};

/// Longest SSE line accepted. A longer line fails the stream.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Line-buffered SSE event decoder.
///
/// Only `data:` fields matter to the relay; `event:`, `id:`, `retry:` and
/// comment lines are skipped. Multiple `data:` lines in one event are joined
/// with `\n`.
///
/// A line over [`MAX_LINE_BYTES`] overflows the decoder: events completed
/// before it are still returned, everything after it is ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
    overflowed: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return the payloads of every event it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut events = Vec::new();
        if self.overflowed {
            return events;
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            if pos > MAX_LINE_BYTES {
                self.overflow(pos);
                return events;
            }
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&line[..line.len() - 1], &mut events);
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            self.overflow(self.buffer.len());
        }

        events
    }

    /// Whether a line exceeded the cap. Once set, no further events are produced.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    fn overflow(&mut self, line_len: usize) {
        tracing::warn!(
            line_bytes = line_len,
            max = MAX_LINE_BYTES,
            "SSE line exceeded buffer cap"
        );
        self.buffer.clear();
        self.data_lines.clear();
        self.overflowed = true;
    }

    /// Flush a trailing line without newline and any event not closed by a
    /// blank line.
    pub fn finish(mut self) -> Vec<String> {
        let mut events = Vec::new();
        if self.overflowed {
            return events;
        }
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line, &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn process_line(&mut self, raw: &[u8], events: &mut Vec<String>) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);

        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (&*line, ""),
        };
        if field == "data" {
            self.data_lines.push(value.to_string());
        }
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if !self.data_lines.is_empty() {
            events.push(self.data_lines.join("\n"));
            self.data_lines.clear();
        }
    }
}

struct DecodeState {
    inner: BoxStream<'static, Result<Bytes>>,
    decoder: Option<SseDecoder>,
    pending: VecDeque<String>,
    /// Reported once `pending` drains.
    failure: Option<Error>,
}

/// Parse one SSE payload into the text it carries.
fn payload_text(payload: &str) -> Option<Result<String>> {
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    let parsed = serde_json::from_str::<GenerateContentResponse>(payload)
        .map_err(|e| Error::Upstream(format!("Malformed stream chunk: {}", e)))
        .and_then(|response| response.text());
    Some(parsed)
}

/// Decode an SSE byte stream into the text of each Gemini chunk, in order.
///
/// The stream ends after the first error. An SSE line over the size cap
/// is an error rather than a silent gap in the text.
pub fn decode_sse_text_stream<S, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<Error>,
{
    let state = DecodeState {
        inner: bytes.map(|chunk| chunk.map_err(Into::into)).boxed(),
        decoder: Some(SseDecoder::new()),
        pending: VecDeque::new(),
        failure: None,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(payload) = st.pending.pop_front() {
                match payload_text(&payload) {
                    Some(Ok(text)) => return Some((Ok(text), st)),
                    Some(Err(e)) => {
                        st.decoder = None;
                        st.pending.clear();
                        return Some((Err(e), st));
                    }
                    None => continue,
                }
            }

            if let Some(e) = st.failure.take() {
                st.decoder = None;
                return Some((Err(e), st));
            }

            let decoder = st.decoder.as_mut()?;
            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    let events = decoder.push(&bytes);
                    st.pending.extend(events);
                    if decoder.overflowed() {
                        st.failure = Some(Error::Upstream(format!(
                            "SSE line exceeded {} bytes",
                            MAX_LINE_BYTES
                        )));
                    }
                }
                Some(Err(e)) => {
                    st.decoder = None;
                    return Some((Err(e), st));
                }
                None => {
                    if let Some(decoder) = st.decoder.take() {
                        st.pending.extend(decoder.finish());
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gemini_event(text: &str) -> String {
        format!(
            "data: {}\r\n\r\n",
            serde_json::json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": text}]},
                    "index": 0
                }]
            })
        )
    }

    /// Split a byte buffer at the given positions to simulate TCP chunk boundaries.
    fn split_at_positions(full: &[u8], split_positions: &[usize]) -> Vec<Bytes> {
        let mut chunks = Vec::new();
        let mut prev = 0;
        for &pos in split_positions {
            if pos > prev && pos < full.len() {
                chunks.push(Bytes::copy_from_slice(&full[prev..pos]));
                prev = pos;
            }
        }
        chunks.push(Bytes::copy_from_slice(&full[prev..]));
        chunks
    }

    async fn collect_texts(chunks: Vec<Bytes>) -> Vec<Result<String>> {
        let source = stream::iter(chunks.into_iter().map(Ok::<_, Error>));
        decode_sse_text_stream(source).collect().await
    }

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"a\":1}\n\n");
        assert_eq!(events, vec!["{\"a\":1}".to_string()]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"da").is_empty());
        assert!(decoder.push(b"ta: {\"x\":").is_empty());
        assert!(decoder.push(b"true}\n").is_empty());
        let events = decoder.push(b"\n");
        assert_eq!(events, vec!["{\"x\":true}".to_string()]);
    }

    #[test]
    fn test_crlf_and_no_space_after_colon() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data:first\r\n\r\ndata: second\r\n\r\n");
        assert_eq!(events, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_non_data_fields_skipped() {
        let mut decoder = SseDecoder::new();
        let events =
            decoder.push(b"event: message\nid: 7\nretry: 5000\n: keep-alive\ndata: payload\n\n");
        assert_eq!(events, vec!["payload".to_string()]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: line one\ndata: line two\n\n");
        assert_eq!(events, vec!["line one\nline two".to_string()]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec!["tail".to_string()]);
    }

    #[test]
    fn test_oversized_partial_line_overflows() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data: ok\n\n"), vec!["ok".to_string()]);

        let mut huge = b"data: ".to_vec();
        huge.extend(vec![b'x'; MAX_LINE_BYTES + 1]);
        assert!(decoder.push(&huge).is_empty());
        assert!(decoder.overflowed());

        // Nothing after the oversized line is decoded.
        assert!(decoder.push(b"xxxx\n\ndata: later\n\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_oversized_complete_line_overflows() {
        let mut decoder = SseDecoder::new();
        let mut chunk = b"data: first\n\ndata: ".to_vec();
        chunk.extend(vec![b'x'; MAX_LINE_BYTES + 1]);
        chunk.extend_from_slice(b"\n\ndata: after\n\n");

        let events = decoder.push(&chunk);
        assert_eq!(events, vec!["first".to_string()]);
        assert!(decoder.overflowed());
    }

    #[tokio::test]
    async fn test_oversized_event_fails_stream_however_split() {
        let text = "y".repeat(MAX_LINE_BYTES + 1024);
        let mut full = gemini_event("before ").into_bytes();
        let oversized_start = full.len();
        full.extend(gemini_event(&text).into_bytes());
        full.extend(gemini_event(" after").into_bytes());

        let splits = [
            vec![],
            vec![oversized_start + 1000],
            vec![oversized_start + MAX_LINE_BYTES - 10],
            vec![oversized_start + MAX_LINE_BYTES + 10],
        ];
        for positions in splits {
            let items = collect_texts(split_at_positions(&full, &positions)).await;
            assert_eq!(items.len(), 2, "splits at {:?}", positions);
            assert_eq!(items[0].as_ref().unwrap(), "before ");
            assert!(
                matches!(items[1], Err(Error::Upstream(_))),
                "splits at {:?}",
                positions
            );
        }
    }

    #[tokio::test]
    async fn test_text_stream_preserves_order_across_splits() {
        let full: Vec<u8> = ["Hello", ", ", "wor", "ld!"]
            .iter()
            .flat_map(|t| gemini_event(t).into_bytes())
            .collect();
        let chunks = split_at_positions(&full, &[3, 40, 41, 97, 150, 151]);
        assert!(chunks.len() > 3);

        let texts: Vec<String> = collect_texts(chunks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(texts.concat(), "Hello, world!");
        assert_eq!(texts.len(), 4);
    }

    #[tokio::test]
    async fn test_text_stream_malformed_payload_ends_stream() {
        let mut full = gemini_event("ok").into_bytes();
        full.extend_from_slice(b"data: {not json}\n\n");
        full.extend(gemini_event("never").into_bytes());

        let items = collect_texts(vec![Bytes::from(full)]).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "ok");
        assert!(matches!(items[1], Err(Error::Upstream(_))));
    }

    #[tokio::test]
    async fn test_text_stream_transport_error_ends_stream() {
        let source = stream::iter(vec![
            Ok(Bytes::from(gemini_event("partial"))),
            Err(Error::Upstream("connection reset".to_string())),
            Ok(Bytes::from(gemini_event("never"))),
        ]);
        let items: Vec<Result<String>> = decode_sse_text_stream(source).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_text_stream_without_trailing_newline() {
        let body = format!(
            "data: {}",
            serde_json::json!({"candidates": [{"content": {"parts": [{"text": "end"}]}}]})
        );
        let items = collect_texts(vec![Bytes::from(body)]).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "end");
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let items = collect_texts(vec![]).await;
        assert!(items.is_empty());
    }
}
