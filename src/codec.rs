//! Wire framing: `NAME LEN:PAYLOAD\n`, payload quoted-printable over arbitrary bytes.
use crate::error::Result;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read boundary ceiling for pipe chunking (see `read_chunk`). Named after the
/// libc buffer-size constant the original implementation keyed its own chunking on.
pub const BUFSIZ: usize = 8192;

/// Encodes `data` as quoted-printable text. Every byte outside the unreserved
/// printable-ASCII set (and `=` itself) becomes `=XX`.
pub fn encode_qp(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        match b {
            b'=' => out.push_str("=3D"),
            0x21..=0x7e => out.push(b as char),
            b' ' | b'\t' => out.push(b as char),
            _ => out.push_str(&format!("={:02X}", b)),
        }
    }
    out
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Inverse of [`encode_qp`]. Tolerates soft line breaks (`=\n`, `=\r\n`) even
/// though this codec's own encoder never emits them.
pub fn decode_qp(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'=' {
            if data.get(i + 1) == Some(&b'\r') && data.get(i + 2) == Some(&b'\n') {
                i += 3;
                continue;
            }
            if data.get(i + 1) == Some(&b'\n') {
                i += 2;
                continue;
            }
            if let (Some(&h), Some(&l)) = (data.get(i + 1), data.get(i + 2)) {
                if let (Some(h), Some(l)) = (hex_val(h), hex_val(l)) {
                    out.push(h << 4 | l);
                    i += 3;
                    continue;
                }
            }
            out.push(b'=');
            i += 1;
        } else {
            out.push(data[i]);
            i += 1;
        }
    }
    out
}

/// A decoded inbound frame: command name plus already quoted-printable-decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub name: String,
    pub payload: Vec<u8>,
}

/// Formats an outbound frame: `name LEN:<qp payload>\n`.
pub fn encode_frame(name: &str, payload: &[u8]) -> Vec<u8> {
    let body = encode_qp(payload);
    let mut out = Vec::with_capacity(name.len() + body.len() + 16);
    out.extend_from_slice(name.as_bytes());
    out.push(b' ');
    out.extend_from_slice(body.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(body.as_bytes());
    out.push(b'\n');
    out
}

/// Incremental, lenient parser over an [`AsyncRead`] byte stream.
///
/// Malformed headers are skipped up to the next newline and parsing resumes;
/// the caller never observes them as errors.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        FrameReader {
            inner,
            buf: BytesMut::with_capacity(BUFSIZ),
        }
    }

    /// Returns the next well-formed frame, or `None` on clean EOF.
    pub async fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        loop {
            if let Some(frame) = self.try_parse()? {
                return Ok(Some(frame));
            }
            let mut chunk = [0u8; BUFSIZ];
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Tries to parse exactly one frame out of the buffered bytes.
    /// `Ok(None)` means "need more bytes"; malformed headers are consumed and
    /// retried in a loop rather than surfaced to the caller.
    fn try_parse(&mut self) -> Result<Option<RawFrame>> {
        loop {
            let data = &self.buf[..];
            let mut pos = 0;
            while pos < data.len() && data[pos].is_ascii_whitespace() {
                pos += 1;
            }
            let name_start = pos;
            while pos < data.len() && !data[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= data.len() {
                return Ok(None);
            }
            let name = String::from_utf8_lossy(&data[name_start..pos]).into_owned();
            while pos < data.len() && data[pos] == b' ' {
                pos += 1;
            }
            let len_start = pos;
            while pos < data.len() && data[pos].is_ascii_digit() {
                pos += 1;
            }
            if len_start == pos {
                match self.skip_malformed_line() {
                    true => continue,
                    false => return Ok(None),
                }
            }
            let len: usize = match String::from_utf8_lossy(&data[len_start..pos]).parse() {
                Ok(v) => v,
                Err(_) => {
                    if self.skip_malformed_line() {
                        continue;
                    }
                    return Ok(None);
                }
            };
            if data.get(pos) != Some(&b':') {
                if self.skip_malformed_line() {
                    continue;
                }
                return Ok(None);
            }
            pos += 1;
            let payload_start = pos;
            let payload_end = payload_start + len;
            if data.len() < payload_end + 1 {
                return Ok(None);
            }
            if data[payload_end] != b'\n' && data[payload_end] != b'\r' {
                if self.skip_malformed_line() {
                    continue;
                }
                return Ok(None);
            }
            let mut consumed = payload_end + 1;
            if data[payload_end] == b'\r' && data.get(payload_end + 1) == Some(&b'\n') {
                consumed += 1;
            }
            let payload = decode_qp(&data[payload_start..payload_end]);
            self.buf.advance(consumed);
            return Ok(Some(RawFrame { name, payload }));
        }
    }

    /// Drops bytes up to and including the next newline, if one is present.
    /// Returns whether a line was actually dropped (vs. needing more input).
    fn skip_malformed_line(&mut self) -> bool {
        if let Some(nl) = self.buf.iter().position(|&b| b == b'\n') {
            self.buf.advance(nl + 1);
            true
        } else {
            false
        }
    }
}

/// Reads one line-bounded chunk from a child pipe: up to and including the
/// first newline, or `BUFSIZ` bytes, whichever comes first. Returns an empty
/// vector on EOF.
pub async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    while out.len() < BUFSIZ {
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            break;
        }
        out.push(byte[0]);
        if byte[0] == b'\n' {
            break;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qp_roundtrip_all_bytes() {
        let data: Vec<u8> = (0u8..=255).collect();
        assert_eq!(decode_qp(encode_qp(&data).as_bytes()), data);
    }

    #[test]
    fn qp_roundtrip_embedded_newlines() {
        let data = b"line one\nline two\r\nNUL\0byte".to_vec();
        assert_eq!(decode_qp(encode_qp(&data).as_bytes()), data);
    }

    #[test]
    fn qp_roundtrip_empty() {
        assert_eq!(decode_qp(encode_qp(&[]).as_bytes()), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn frame_reader_parses_simple_frame() {
        let input = b"Control 3:run\n".to_vec();
        let mut reader = FrameReader::new(std::io::Cursor::new(input));
        let frame = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.name, "Control");
        assert_eq!(frame.payload, b"run");
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn frame_reader_decodes_payload() {
        let raw = encode_frame("Source", b"int main(){}\n");
        let mut reader = FrameReader::new(std::io::Cursor::new(raw));
        let frame = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.name, "Source");
        assert_eq!(frame.payload, b"int main(){}\n");
    }

    #[tokio::test]
    async fn frame_reader_skips_malformed_header_and_resumes() {
        let mut input = b"garbage not a frame\n".to_vec();
        input.extend_from_slice(&encode_frame("Version", b""));
        let mut reader = FrameReader::new(std::io::Cursor::new(input));
        let frame = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.name, "Version");
    }

    #[tokio::test]
    async fn frame_reader_concatenation_is_caller_responsibility() {
        let mut input = encode_frame("CompilerOption", b"warn");
        input.extend_from_slice(&encode_frame("CompilerOption", b",opt"));
        let mut reader = FrameReader::new(std::io::Cursor::new(input));
        let a = reader.next_frame().await.unwrap().unwrap();
        let b = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(a.payload, b"warn");
        assert_eq!(b.payload, b",opt");
    }

    #[test]
    fn encode_frame_len_matches_encoded_payload() {
        let frame = encode_frame("StdOut", b"hi\xff\n");
        let text = String::from_utf8_lossy(&frame);
        let colon = text.find(':').unwrap();
        let header = &text[..colon];
        let len: usize = header.split(' ').nth(1).unwrap().parse().unwrap();
        let payload_and_nl = &frame[colon + 1..];
        assert_eq!(payload_and_nl.len(), len + 1);
        assert_eq!(*payload_and_nl.last().unwrap(), b'\n');
    }

    #[tokio::test]
    async fn read_chunk_stops_at_newline() {
        let mut cursor = std::io::Cursor::new(b"hello\nworld".to_vec());
        let chunk = read_chunk(&mut cursor).await.unwrap();
        assert_eq!(chunk, b"hello\n");
    }

    #[tokio::test]
    async fn read_chunk_caps_at_bufsiz_without_newline() {
        let data = vec![b'x'; BUFSIZ + 100];
        let mut cursor = std::io::Cursor::new(data);
        let chunk = read_chunk(&mut cursor).await.unwrap();
        assert_eq!(chunk.len(), BUFSIZ);
    }

    #[tokio::test]
    async fn read_chunk_empty_at_eof() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let chunk = read_chunk(&mut cursor).await.unwrap();
        assert!(chunk.is_empty());
    }
}
