// Copyright 2025 Ideagraph Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Line-framed event decoder
//!
//! Turns transport chunks with arbitrary boundaries into [`Event`]s. Only
//! lines starting with the `data:` prefix are significant; comments,
//! `event:`/`id:` fields and blank keep-alive lines are skipped.
//!
//! A line that fails to decode is reported as a [`DecodeFault`] and the
//! decoder moves on to the next line, so one malformed record never ends
//! a session. The decoder only holds the line in progress (plus whatever
//! part of the last chunk has not been consumed yet).

use crate::config::DecoderConfig;
use crate::error::{DecodeFault, DecodeFaultKind};
use crate::event::Event;
use bytes::{Buf, BytesMut};
use futures::stream::{Stream, StreamExt};
use tracing::{debug, warn};

/// Framing prefix of a significant line
pub const DATA_PREFIX: &str = "data:";

/// Outcome of decoding one line
pub type Decoded = Result<Event, DecodeFault>;

/// Push-style decoder: feed chunks, then drain events
#[derive(Debug)]
pub struct EventDecoder {
    buffer: BytesMut,
    /// Bytes of `buffer` already known to contain no newline
    scanned: usize,
    /// Set while skipping the rest of an over-long line
    discarding: bool,
    line: u64,
    faults: u64,
    max_line_bytes: usize,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl EventDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            discarding: false,
            line: 0,
            faults: 0,
            max_line_bytes: config.max_line_bytes,
        }
    }

    /// Append a transport chunk
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next decoded event or fault from the complete lines fed so far
    ///
    /// Returns `None` once only a partial line (or nothing) remains.
    pub fn next_event(&mut self) -> Option<Decoded> {
        loop {
            let newline = self.buffer[self.scanned..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|pos| self.scanned + pos);

            let Some(end) = newline else {
                if self.discarding {
                    self.buffer.clear();
                    self.scanned = 0;
                    return None;
                }
                if self.buffer.len() > self.max_line_bytes {
                    // The line can never become valid; drop what we have and skip to its end
                    let len = self.buffer.len();
                    self.buffer.clear();
                    self.scanned = 0;
                    self.discarding = true;
                    return Some(Err(self.fault(
                        self.line + 1,
                        DecodeFaultKind::LineTooLong,
                        format!("line exceeds {} bytes ({} buffered)", self.max_line_bytes, len),
                    )));
                }
                self.scanned = self.buffer.len();
                return None;
            };

            let line = self.buffer.split_to(end);
            self.buffer.advance(1);
            self.scanned = 0;
            self.line += 1;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_line_bytes {
                return Some(Err(self.fault(
                    self.line,
                    DecodeFaultKind::LineTooLong,
                    format!("line exceeds {} bytes ({})", self.max_line_bytes, line.len()),
                )));
            }
            if let Some(decoded) = self.decode_line(&line) {
                return Some(decoded);
            }
        }
    }

    /// Flush the final line at end of input
    ///
    /// End of input terminates an unterminated last line.
    pub fn finish(&mut self) -> Option<Decoded> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if self.discarding {
            self.discarding = false;
            return None;
        }
        if rest.is_empty() {
            return None;
        }
        self.line += 1;
        self.decode_line(&rest)
    }

    /// Number of lines seen so far (complete lines only)
    pub fn lines(&self) -> u64 {
        self.line
    }

    /// Number of faults reported so far
    pub fn fault_count(&self) -> u64 {
        self.faults
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<Decoded> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let payload = raw.strip_prefix(DATA_PREFIX.as_bytes())?;
        let payload = payload.strip_prefix(b" ").unwrap_or(payload);

        let text = match std::str::from_utf8(payload) {
            Ok(text) => text,
            Err(e) => {
                return Some(Err(self.fault(self.line, DecodeFaultKind::InvalidUtf8, e.to_string())))
            }
        };

        match Event::parse_record(text, self.line) {
            Ok(event) => {
                debug!(line = self.line, event_type = event.kind.type_name(), "decoded event");
                Some(Ok(event))
            }
            Err(fault) => {
                self.faults += 1;
                warn!(line = fault.line, kind = ?fault.kind, "dropping undecodable line: {}", fault.message);
                Some(Err(fault))
            }
        }
    }

    fn fault(&mut self, line: u64, kind: DecodeFaultKind, message: String) -> DecodeFault {
        self.faults += 1;
        warn!(line, ?kind, "dropping undecodable line: {}", message);
        DecodeFault::new(line, kind, message)
    }
}

/// Lazily decode a chunked transport stream
///
/// Yields events and faults in stream order. A transport error ends the
/// sequence; the partial line in progress is dropped with it.
pub fn decode_stream<S, B, E>(chunks: S, config: DecoderConfig) -> impl Stream<Item = Decoded>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut decoder = EventDecoder::new(config);
        tokio::pin!(chunks);

        let mut clean_end = true;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    decoder.feed(bytes.as_ref());
                    while let Some(decoded) = decoder.next_event() {
                        yield decoded;
                    }
                }
                Err(e) => {
                    warn!(line = decoder.lines(), "transport error, ending stream: {}", e);
                    clean_end = false;
                    break;
                }
            }
        }

        if clean_end {
            if let Some(decoded) = decoder.finish() {
                yield decoded;
            }
        }
        debug!(lines = decoder.lines(), faults = decoder.fault_count(), "event stream ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use futures::stream;
    use std::convert::Infallible;

    fn drain(decoder: &mut EventDecoder) -> Vec<Decoded> {
        let mut out = Vec::new();
        while let Some(d) = decoder.next_event() {
            out.push(d);
        }
        out
    }

    #[test]
    fn test_reassembles_lines_split_across_chunks() {
        let mut decoder = EventDecoder::default();
        decoder.feed(b"data: {\"type\":\"que");
        assert!(drain(&mut decoder).is_empty());

        decoder.feed(b"ry\",\"data\":{\"query\":\"q\"}}\ndata: {\"type\":");
        let first = drain(&mut decoder);
        assert_eq!(first.len(), 1);
        assert_eq!(
            first[0].as_ref().unwrap().kind,
            EventKind::Query { query: "q".into() }
        );

        decoder.feed(b"\"complete\"}\r\n");
        let second = drain(&mut decoder);
        assert_eq!(second[0].as_ref().unwrap().kind, EventKind::Complete);
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let line = "data: {\"type\":\"query\",\"data\":{\"query\":\"übermensch\"}}\n";
        let bytes = line.as_bytes();
        let split = line.find('ü').unwrap() + 1; // inside the two-byte sequence

        let mut decoder = EventDecoder::default();
        decoder.feed(&bytes[..split]);
        assert!(drain(&mut decoder).is_empty());
        decoder.feed(&bytes[split..]);

        let events = drain(&mut decoder);
        assert_eq!(
            events[0].as_ref().unwrap().kind,
            EventKind::Query { query: "übermensch".into() }
        );
    }

    #[test]
    fn test_ignores_non_data_lines() {
        let mut decoder = EventDecoder::default();
        decoder.feed(b": keep-alive\n\nevent: message\nid: 4\ndata: {\"type\":\"start\"}\n");
        let events = drain(&mut decoder);
        assert_eq!(events.len(), 1);
        assert_eq!(decoder.lines(), 5);
        assert_eq!(decoder.fault_count(), 0);
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut decoder = EventDecoder::default();
        decoder.feed(b"data: {\"type\":\"start\"}\ndata: {oops\ndata: {\"type\":\"complete\"}\n");
        let events = drain(&mut decoder);

        assert_eq!(events.len(), 3);
        assert!(events[0].is_ok());
        let fault = events[1].as_ref().unwrap_err();
        assert_eq!(fault.line, 2);
        assert_eq!(fault.kind, DecodeFaultKind::InvalidJson);
        assert!(events[2].is_ok());
        assert_eq!(decoder.fault_count(), 1);
    }

    #[test]
    fn test_over_long_line_is_dropped() {
        let mut decoder = EventDecoder::new(DecoderConfig { max_line_bytes: 32 });
        decoder.feed(b"data: {\"type\":\"query\",\"data\":{\"query\":\"");
        let faults = drain(&mut decoder);
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].as_ref().unwrap_err().kind, DecodeFaultKind::LineTooLong);

        decoder.feed(b"still the same very long line\"}}\ndata: {\"type\":\"start\"}\n");
        let events = drain(&mut decoder);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().kind, EventKind::Start);
        assert_eq!(decoder.lines(), 2);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = EventDecoder::default();
        decoder.feed(b"data: {\"type\":\"complete\"}");
        assert!(drain(&mut decoder).is_empty());

        let last = decoder.finish().unwrap().unwrap();
        assert_eq!(last.kind, EventKind::Complete);
        assert!(decoder.finish().is_none());
    }

    #[tokio::test]
    async fn test_decode_stream_in_order() {
        let chunks = vec![
            Ok::<_, Infallible>("data: {\"type\":\"start\"}\nda".to_string()),
            Ok("ta: {\"type\":\"sources_found\",\"data\":{\"count\":3}}\n".to_string()),
            Ok("data: {\"type\":\"complete\"}".to_string()),
        ];

        let decoded: Vec<Decoded> = decode_stream(stream::iter(chunks), DecoderConfig::default())
            .collect()
            .await;
        let kinds: Vec<EventKind> = decoded.into_iter().map(|d| d.unwrap().kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Start,
                EventKind::SourcesFound { count: 3 },
                EventKind::Complete
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let chunks = vec![
            Ok("data: {\"type\":\"start\"}\ndata: {\"type\":\"comp".to_string()),
            Err("connection reset"),
            Ok("lete\"}\n".to_string()),
        ];

        let decoded: Vec<Decoded> = decode_stream(stream::iter(chunks), DecoderConfig::default())
            .collect()
            .await;
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].as_ref().unwrap().kind, EventKind::Start);
    }
}
