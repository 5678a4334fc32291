//! Incremental decoding of the completion event stream.
//!
//! The relay pipes the gateway's body through untouched, so the client sees
//! raw network chunks that may cut a line, a JSON payload, or a multi-byte
//! character anywhere. [`FrameDecoder`] turns those chunks into the ordered
//! text deltas of the reply; [`DecodeSession`] also keeps the running total.

use memchr::memchr;
use tracing::debug;

use crate::api::StreamEnvelope;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Skip,
    Delta(String),
    Done,
    Malformed,
}

fn classify_line(raw: &str) -> LineOutcome {
    let line = raw.strip_suffix('\r').unwrap_or(raw);
    if line.starts_with(':') || line.trim().is_empty() {
        return LineOutcome::Skip;
    }

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return LineOutcome::Done;
    }
    if payload.is_empty() {
        return LineOutcome::Skip;
    }

    match serde_json::from_str::<StreamEnvelope>(payload) {
        Ok(envelope) => match envelope.into_delta() {
            Some(delta) if !delta.is_empty() => LineOutcome::Delta(delta),
            _ => LineOutcome::Skip,
        },
        Err(_) => LineOutcome::Malformed,
    }
}

/// Stateful UTF-8 decoder that holds back an incomplete trailing sequence
/// until the rest of the character arrives.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8], out: &mut String) {
        self.pending.extend_from_slice(chunk);

        let mut input: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    input = &[];
                    break;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - input.len();
        self.pending.drain(..consumed);
    }

    fn flush(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            out.push(char::REPLACEMENT_CHARACTER);
            self.pending.clear();
        }
    }
}

/// Line framer for one response body. Single use: once the sentinel has been
/// seen or [`FrameDecoder::finish`] has run, further input is ignored.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8: Utf8Decoder,
    carry: String,
    retried_line: Option<String>,
    sentinel_seen: bool,
    finished: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one network chunk and return the deltas it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.is_closed() || chunk.is_empty() {
            return deltas;
        }

        self.utf8.decode(chunk, &mut self.carry);
        self.drain_complete_lines(&mut deltas);
        deltas
    }

    /// Terminal flush once the transport reports end of body. Whatever is
    /// left in the carry-over is processed line by line; unparsable lines are
    /// dropped since no more data can complete them.
    pub fn finish(&mut self) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.is_closed() {
            return deltas;
        }
        self.finished = true;

        self.utf8.flush(&mut self.carry);
        let remainder = std::mem::take(&mut self.carry);
        for line in remainder.split('\n') {
            match classify_line(line) {
                LineOutcome::Delta(delta) => deltas.push(delta),
                LineOutcome::Done => {
                    self.sentinel_seen = true;
                    break;
                }
                LineOutcome::Malformed => {
                    debug!(
                        line_len = line.len(),
                        "skipping unparsable trailing stream line"
                    );
                }
                LineOutcome::Skip => {}
            }
        }
        deltas
    }

    /// Whether the `[DONE]` sentinel has been observed.
    pub fn is_done(&self) -> bool {
        self.sentinel_seen
    }

    fn is_closed(&self) -> bool {
        self.sentinel_seen || self.finished
    }

    fn drain_complete_lines(&mut self, deltas: &mut Vec<String>) {
        while let Some(newline) = memchr(b'\n', self.carry.as_bytes()) {
            let mut line: String = self.carry.drain(..=newline).collect();
            line.pop();

            match classify_line(&line) {
                LineOutcome::Skip => {}
                LineOutcome::Delta(delta) => deltas.push(delta),
                LineOutcome::Done => {
                    self.sentinel_seen = true;
                    self.carry.clear();
                    return;
                }
                LineOutcome::Malformed => {
                    if self.retried_line.as_deref() == Some(line.as_str()) {
                        debug!(
                            line_len = line.len(),
                            "dropping stream line that failed to parse twice"
                        );
                        self.retried_line = None;
                        continue;
                    }
                    // Each line gets exactly one retry on the next chunk.
                    line.push('\n');
                    self.carry.insert_str(0, &line);
                    line.pop();
                    self.retried_line = Some(line);
                    return;
                }
            }
        }
    }
}

/// A [`FrameDecoder`] plus the accumulated reply text for one request.
#[derive(Debug, Default)]
pub struct DecodeSession {
    decoder: FrameDecoder,
    content: String,
}

impl DecodeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the full accumulated text when it changed.
    pub fn push(&mut self, chunk: &[u8]) -> Option<&str> {
        let deltas = self.decoder.feed(chunk);
        self.absorb(deltas)
    }

    pub fn finish(mut self) -> String {
        let deltas = self.decoder.finish();
        self.absorb(deltas);
        self.content
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_done(&self) -> bool {
        self.decoder.is_done()
    }

    fn absorb(&mut self, deltas: Vec<String>) -> Option<&str> {
        if deltas.is_empty() {
            return None;
        }
        for delta in deltas {
            self.content.push_str(&delta);
        }
        Some(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_line(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn decode_chunks(chunks: &[&[u8]]) -> String {
        let mut session = DecodeSession::new();
        for chunk in chunks {
            session.push(chunk);
        }
        session.finish()
    }

    #[test]
    fn sentinel_stops_before_later_lines() {
        let stream = format!(
            "{}{}data: [DONE]\n{}",
            data_line("A"),
            data_line("B"),
            data_line("C")
        );
        let mut decoder = FrameDecoder::new();
        let deltas = decoder.feed(stream.as_bytes());
        assert_eq!(deltas, vec!["A".to_string(), "B".to_string()]);
        assert!(decoder.is_done());
        assert!(decoder.feed(data_line("D").as_bytes()).is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn keep_alive_comments_do_not_affect_output() {
        let stream = format!(
            ": keep-alive\n{}: keep-alive\n\n{}: ping\ndata: [DONE]\n",
            data_line("Hel"),
            data_line("lo")
        );
        assert_eq!(decode_chunks(&[stream.as_bytes()]), "Hello");
    }

    #[test]
    fn json_split_across_chunks_is_reassembled() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(br#"data: {"choi"#).is_empty());
        let deltas = decoder.feed(b"ces\":[{\"delta\":{\"content\":\"X\"}}]}\n");
        assert_eq!(deltas, vec!["X".to_string()]);
    }

    #[test]
    fn multibyte_character_split_across_chunks_is_preserved() {
        let stream = data_line("héllo ✓ 🦀");
        let bytes = stream.as_bytes();
        let crab = stream.find('🦀').unwrap();

        for cut in [crab + 1, crab + 2, crab + 3] {
            let result = decode_chunks(&[&bytes[..cut], &bytes[cut..]]);
            assert_eq!(result, "héllo ✓ 🦀", "cut at byte {cut}");
        }
    }

    #[test]
    fn every_segmentation_yields_identical_text() {
        let stream = format!(
            ": keep-alive\r\n{}{}event: noise\n{}data: {{\"choi\n{}data: [DONE]\n{}",
            data_line("Ünïcode "),
            data_line("and emoji 🦀 "),
            data_line("with\nnewline "),
            data_line("tail"),
            data_line("after done"),
        );
        let bytes = stream.as_bytes();
        let expected = decode_chunks(&[bytes]);
        assert_eq!(expected, "Ünïcode and emoji 🦀 with\nnewline tail");

        for cut in 0..=bytes.len() {
            let result = decode_chunks(&[&bytes[..cut], &bytes[cut..]]);
            assert_eq!(result, expected, "single cut at byte {cut}");
        }

        let byte_at_a_time: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_chunks(&byte_at_a_time), expected);

        for size in [2, 3, 5, 7, 16, 64] {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            assert_eq!(decode_chunks(&chunks), expected, "chunk size {size}");
        }
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let stream = "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\r\ndata: [DONE]\r\n";
        assert_eq!(decode_chunks(&[stream.as_bytes()]), "ok");
    }

    #[test]
    fn lines_without_the_data_marker_are_ignored() {
        let stream = format!(
            "event: message\nid: 4\ndata:{{\"choices\":[{{\"delta\":{{\"content\":\"nospace\"}}}}]}}\n{}",
            data_line("kept")
        );
        assert_eq!(decode_chunks(&[stream.as_bytes()]), "kept");
    }

    #[test]
    fn truncated_json_at_end_of_stream_is_skipped() {
        let stream = format!("{}data: {{\"choices\":[{{\"delta\":", data_line("intact"));
        let mut session = DecodeSession::new();
        assert_eq!(session.push(stream.as_bytes()), Some("intact"));
        assert_eq!(session.finish(), "intact");
    }

    #[test]
    fn malformed_complete_line_is_retried_once_then_dropped() {
        let mut decoder = FrameDecoder::new();
        let first = format!("data: not json\n{}", data_line("A"));
        assert!(decoder.feed(first.as_bytes()).is_empty());

        let deltas = decoder.feed(data_line("B").as_bytes());
        assert_eq!(deltas, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(decoder.feed(data_line("C").as_bytes()), vec!["C".to_string()]);
    }

    #[test]
    fn malformed_line_before_end_of_stream_does_not_lose_later_deltas() {
        let stream = format!("data: {{oops}}\n{}{}", data_line("x"), data_line("y"));
        assert_eq!(decode_chunks(&[stream.as_bytes()]), "xy");
    }

    #[test]
    fn null_choices_and_deltas_are_skipped_without_holding_back_later_lines() {
        let mut decoder = FrameDecoder::new();
        let stream = format!(
            "data: {{\"choices\":null}}\ndata: {{\"choices\":[{{\"delta\":null}}]}}\n{}",
            data_line("after")
        );
        assert_eq!(decoder.feed(stream.as_bytes()), vec!["after".to_string()]);
    }

    #[test]
    fn sentinel_in_terminal_flush_stops_processing() {
        let stream = format!("data: {{broken\n{}data: [DONE]\n{}", data_line("a"), data_line("b"));
        assert_eq!(decode_chunks(&[stream.as_bytes()]), "a");
    }

    #[test]
    fn unterminated_final_line_is_flushed() {
        let stream = data_line("last");
        let without_newline = stream.trim_end_matches('\n');
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(without_newline.as_bytes()).is_empty());
        assert_eq!(decoder.finish(), vec!["last".to_string()]);
    }

    #[test]
    fn invalid_utf8_becomes_replacement_character() {
        let mut bytes = b"data: {\"choices\":[{\"delta\":{\"content\":\"a".to_vec();
        bytes.push(0xFF);
        bytes.extend_from_slice(b"b\"}}]}\n");
        assert_eq!(decode_chunks(&[&bytes]), "a\u{FFFD}b");
    }

    #[test]
    fn empty_and_null_deltas_do_not_report_changes() {
        let mut session = DecodeSession::new();
        assert_eq!(session.push(data_line("").as_bytes()), None);
        assert_eq!(
            session.push(b"data: {\"choices\":[{\"delta\":{\"content\":null}}]}\n"),
            None
        );
        assert_eq!(session.push(b"data: {\"choices\":[]}\n"), None);
        assert_eq!(session.push(data_line("z").as_bytes()), Some("z"));
        assert_eq!(session.content(), "z");
    }

    #[test]
    fn session_reports_cumulative_content() {
        let mut session = DecodeSession::new();
        assert_eq!(session.push(data_line("one ").as_bytes()), Some("one "));
        assert_eq!(session.push(data_line("two").as_bytes()), Some("one two"));
        assert!(!session.is_done());
        session.push(b"data: [DONE]\n");
        assert!(session.is_done());
        assert_eq!(session.finish(), "one two");
    }
}
