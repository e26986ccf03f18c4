//! Minimal `text/event-stream` framing: only `data:` lines matter here.

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;

use crate::common::UploadError;

/// Largest event accepted, counting buffered `data:` lines and the
/// unterminated line in progress
pub const MAX_EVENT_BYTES: usize = 256 * 1024;

/// Incremental SSE decoder. Feed raw body chunks, get back complete event payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    // prefix of `buffer` already known to hold no newline
    scanned: usize,
    data: Vec<String>,
    data_bytes: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and append every event it completes to `out`.
    /// Fails once an event grows past `MAX_EVENT_BYTES`; the decoder is
    /// unusable afterwards.
    pub fn push(&mut self, chunk: &[u8], out: &mut impl Extend<String>) -> Result<(), UploadError> {
        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;
            self.scanned = start;

            if let Some(event) = self.process_line(line.strip_suffix('\r').unwrap_or(&line)) {
                out.extend(Some(event));
            }
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() + self.data_bytes > MAX_EVENT_BYTES {
            self.buffer.clear();
            self.scanned = 0;
            self.data.clear();
            self.data_bytes = 0;
            return Err(UploadError::StreamTransport(format!(
                "event exceeds {} bytes",
                MAX_EVENT_BYTES
            )));
        }
        Ok(())
    }

    /// Flush at end of stream. A trailing event without its blank line still counts.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.scanned = 0;
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(event) = self.process_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        // comment / keep-alive
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        // event, id and retry are not used by the progress endpoint
        if field == "data" {
            self.data_bytes += value.len() + 1;
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        self.data_bytes = 0;
        Some(payload)
    }
}

/// Turn a response body into a stream of event payloads.
/// A body error or an oversized event ends the stream after yielding one
/// `StreamTransport` item.
pub fn sse_payloads<S, E>(body: S) -> BoxStream<'static, Result<String, UploadError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = (body.boxed(), SseDecoder::new(), VecDeque::new(), None, false);

    stream::unfold(
        state,
        |(mut body, mut decoder, mut pending, mut failure, mut done)| async move {
            loop {
                if let Some(payload) = pending.pop_front() {
                    return Some((Ok(payload), (body, decoder, pending, failure, done)));
                }
                if let Some(err) = failure.take() {
                    return Some((Err(err), (body, decoder, pending, None, done)));
                }
                if done {
                    return None;
                }

                match body.next().await {
                    Some(Ok(chunk)) => {
                        if let Err(err) = decoder.push(&chunk, &mut pending) {
                            failure = Some(err);
                            done = true;
                        }
                    }
                    Some(Err(e)) => {
                        failure = Some(UploadError::StreamTransport(e.to_string()));
                        done = true;
                    }
                    None => {
                        done = true;
                        pending.extend(decoder.finish());
                    }
                }
            }
        },
    )
    .boxed()
}
