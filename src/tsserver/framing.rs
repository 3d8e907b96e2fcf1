//! Stream demultiplexing for tsserver stdout.
//!
//! tsserver writes LSP-style frames:
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <payload>
//! ```
//! Older deployments emit one JSON object per line instead. A decoder is
//! built for exactly one of the two modes; it never guesses.

use crate::tsserver::error::ClientError;

/// Separator between the header block and the body.
pub const HEADER_DELIMITER: &[u8] = b"\r\n\r\n";

const CONTENT_LENGTH: &str = "Content-Length";

/// How frames are delimited on the server's stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FramingMode {
    /// `Content-Length` header followed by exactly that many body bytes.
    #[default]
    ContentLength,
    /// One payload per line; lines not starting with `{` are ignored.
    Lines,
}

/// Incremental frame decoder.
///
/// Chunks are appended with [`FrameDecoder::push`] in arrival order and
/// complete frames are pulled with [`FrameDecoder::next_frame`]. Partial
/// data stays buffered until the next chunk completes it.
pub struct FrameDecoder {
    mode: FramingMode,
    buffer: Vec<u8>,
    /// Body length from a header that has been consumed while the body is
    /// still incomplete.
    pending_length: Option<usize>,
}

impl FrameDecoder {
    pub fn new(mode: FramingMode) -> Self {
        Self { mode, buffer: Vec::new(), pending_length: None }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Number of bytes held back waiting for more input.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Extract the next complete frame body, if any.
    ///
    /// `Some(Err(MalformedFrame))` means a header was discarded; the decoder
    /// has already moved past it and the next call resumes scanning.
    pub fn next_frame(&mut self) -> Option<Result<Vec<u8>, ClientError>> {
        match self.mode {
            FramingMode::ContentLength => self.next_length_prefixed(),
            FramingMode::Lines => self.next_line(),
        }
    }

    /// Lazily drain every frame currently available.
    pub fn frames(&mut self) -> impl Iterator<Item = Result<Vec<u8>, ClientError>> + '_ {
        std::iter::from_fn(move || self.next_frame())
    }

    fn next_length_prefixed(&mut self) -> Option<Result<Vec<u8>, ClientError>> {
        let length = match self.pending_length {
            Some(length) => length,
            None => {
                let end = find_subslice(&self.buffer, HEADER_DELIMITER)?;
                let header: Vec<u8> = self.buffer.drain(..end + HEADER_DELIMITER.len()).collect();
                match parse_content_length(&header[..end]) {
                    Ok(length) => {
                        self.pending_length = Some(length);
                        length
                    }
                    Err(reason) => return Some(Err(ClientError::MalformedFrame { reason })),
                }
            }
        };

        if self.buffer.len() < length {
            return None;
        }

        self.pending_length = None;
        Some(Ok(self.buffer.drain(..length).collect()))
    }

    fn next_line(&mut self) -> Option<Result<Vec<u8>, ClientError>> {
        loop {
            let newline = self.buffer.iter().position(|&b| b == b'\n')?;
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();

            if trimmed.starts_with('{') {
                return Some(Ok(trimmed.as_bytes().to_vec()));
            }
            if !trimmed.is_empty() {
                tracing::debug!(
                    "Ignoring non-payload line: {}",
                    trimmed.chars().take(200).collect::<String>()
                );
            }
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Pull the `Content-Length` value out of a header block. Other headers
/// (e.g. `Content-Type`) are ignored.
fn parse_content_length(header: &[u8]) -> Result<usize, String> {
    let header = String::from_utf8_lossy(header);

    for line in header.lines() {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let value = value.trim();
            return value
                .parse::<usize>()
                .map_err(|_| format!("non-numeric {CONTENT_LENGTH}: {value:?}"));
        }
    }

    Err(format!("missing {CONTENT_LENGTH} in header {:?}", header.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{body}", body.len()).into_bytes()
    }

    fn decode_all(decoder: &mut FrameDecoder) -> Vec<Vec<u8>> {
        decoder.frames().filter_map(Result::ok).collect()
    }

    #[test]
    fn test_header_split_across_chunks() {
        let mut decoder = FrameDecoder::new(FramingMode::ContentLength);
        let wire = b"Content-Length: 13\r\n\r\n{\"ok\":true}\n\n";

        decoder.push(&wire[..9]);
        assert!(decoder.next_frame().is_none());

        decoder.push(&wire[9..]);
        let body = decoder.next_frame().unwrap().unwrap();
        assert_eq!(body, b"{\"ok\":true}\n\n");
        assert_eq!(body.len(), 13);
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_every_split_point_yields_same_frames() {
        let mut wire = frame(r#"{"seq":0,"type":"event","event":"typingsInstallerPid"}"#);
        wire.extend(frame(""));
        wire.extend(frame("{\"type\":\"response\",\"request_seq\":1,\"success\":true}\n"));

        let mut whole = FrameDecoder::new(FramingMode::ContentLength);
        whole.push(&wire);
        let expected = decode_all(&mut whole);
        assert_eq!(expected.len(), 3);

        for split in 0..=wire.len() {
            let mut decoder = FrameDecoder::new(FramingMode::ContentLength);
            decoder.push(&wire[..split]);
            let mut got = decode_all(&mut decoder);
            decoder.push(&wire[split..]);
            got.extend(decode_all(&mut decoder));
            assert_eq!(got, expected, "split at byte {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut wire = frame("{\"a\":1}");
        wire.extend(frame("{\"b\":2}"));

        let mut decoder = FrameDecoder::new(FramingMode::ContentLength);
        let mut got = Vec::new();
        for byte in &wire {
            decoder.push(std::slice::from_ref(byte));
            got.extend(decode_all(&mut decoder));
        }
        assert_eq!(got, vec![b"{\"a\":1}".to_vec(), b"{\"b\":2}".to_vec()]);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut decoder = FrameDecoder::new(FramingMode::ContentLength);
        let mut wire = frame("first");
        wire.extend(frame("second"));
        wire.extend(b"Content-Len");
        decoder.push(&wire);

        assert_eq!(decode_all(&mut decoder), vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(decoder.buffered(), "Content-Len".len());
    }

    #[test]
    fn test_zero_length_body() {
        let mut decoder = FrameDecoder::new(FramingMode::ContentLength);
        decoder.push(b"Content-Length: 0\r\n\r\n");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_extra_headers_and_case() {
        let mut decoder = FrameDecoder::new(FramingMode::ContentLength);
        decoder.push(b"content-length: 2\r\nContent-Type: application/json\r\n\r\n{}");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"{}");
    }

    #[test]
    fn test_missing_length_is_skipped() {
        let mut decoder = FrameDecoder::new(FramingMode::ContentLength);
        let mut wire = b"Content-Type: text/plain\r\n\r\n".to_vec();
        wire.extend(frame("{}"));
        decoder.push(&wire);

        assert!(matches!(decoder.next_frame(), Some(Err(ClientError::MalformedFrame { .. }))));
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"{}");
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_non_numeric_length_is_skipped() {
        let mut decoder = FrameDecoder::new(FramingMode::ContentLength);
        let mut wire = b"Content-Length: lots\r\n\r\n".to_vec();
        wire.extend(frame("{\"x\":1}"));
        decoder.push(&wire);

        let results: Vec<_> = decoder.frames().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert_eq!(results[1].as_ref().unwrap(), b"{\"x\":1}");
    }

    #[test]
    fn test_multibyte_body_counts_bytes() {
        let body = r#"{"text":"héllo ✓"}"#;
        let mut decoder = FrameDecoder::new(FramingMode::ContentLength);
        decoder.push(&frame(body));
        assert_eq!(decoder.next_frame().unwrap().unwrap(), body.as_bytes());
    }

    #[test]
    fn test_lines_mode() {
        let mut decoder = FrameDecoder::new(FramingMode::Lines);
        decoder.push(b"Content-Length: 20\r\n\r\n  {\"a\":1}\r\nnoise\n{\"b\"");
        assert_eq!(decode_all(&mut decoder), vec![b"{\"a\":1}".to_vec()]);

        decoder.push(b":2}\n");
        assert_eq!(decode_all(&mut decoder), vec![b"{\"b\":2}".to_vec()]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_lines_mode_waits_for_newline() {
        let mut decoder = FrameDecoder::new(FramingMode::Lines);
        decoder.push(b"{\"partial\":true}");
        assert!(decoder.next_frame().is_none());
        decoder.push(b"\n");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"{\"partial\":true}");
    }
}
