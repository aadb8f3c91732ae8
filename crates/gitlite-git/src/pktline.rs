//! Git pkt-line format implementation.
//!
//! The pkt-line format is used for all git protocol communication.
//! Each line is prefixed with a 4-character hex length that counts the
//! prefix itself, or "0000" for flush.

use crate::{GitError, Result};
use std::io::{ErrorKind, Read, Write};

/// Largest total line length (prefix included) git accepts.
pub const MAX_PKT_LEN: usize = 65520;
const LEN_PREFIX: usize = 4;

/// A pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content.
    Data(Vec<u8>),
    /// Flush packet (0000).
    Flush,
}

impl PktLine {
    /// Creates a data packet from a string slice.
    pub fn from_string(s: &str) -> Self {
        Self::Data(s.as_bytes().to_vec())
    }

    /// Creates a data packet from bytes.
    pub fn from_bytes(b: impl Into<Vec<u8>>) -> Self {
        Self::Data(b.into())
    }

    /// Encodes the packet to bytes, data written as-is.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Self::Data(data) => {
                let len = data.len() + LEN_PREFIX;
                if len > MAX_PKT_LEN {
                    return Err(GitError::InvalidPktLine(format!(
                        "line of {} bytes exceeds {}",
                        len, MAX_PKT_LEN
                    )));
                }
                let mut result = format!("{:04x}", len).into_bytes();
                result.extend_from_slice(data);
                Ok(result)
            }
            Self::Flush => Ok(b"0000".to_vec()),
        }
    }

    /// Returns true if this is a flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }

    /// Returns the data content, or None for flush.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            Self::Flush => None,
        }
    }

    /// Returns the data as a string, trimming any trailing newline.
    pub fn as_str(&self) -> Option<&str> {
        self.data()
            .and_then(|d| std::str::from_utf8(d).ok())
            .map(|s| s.trim_end_matches('\n'))
    }
}

/// Frames each payload as a newline-terminated line, then a flush.
///
/// Every line's length field is `payload + 5`: the prefix, the payload and
/// the appended `\n`.
pub fn encode<L: AsRef<[u8]>>(lines: &[L]) -> Result<Vec<u8>> {
    let mut writer = PktLineWriter::new(Vec::new());
    for line in lines {
        writer.write_data_line(line.as_ref())?;
    }
    writer.flush_pkt()?;
    Ok(writer.into_inner())
}

fn parse_len(prefix: &[u8], offset: usize) -> Result<usize> {
    if !prefix.iter().all(u8::is_ascii_hexdigit) {
        return Err(GitError::InvalidPktLine(format!(
            "invalid length prefix {:?} at offset {}",
            String::from_utf8_lossy(prefix),
            offset
        )));
    }
    // All four bytes are hex digits, so both conversions succeed.
    let len = std::str::from_utf8(prefix)
        .ok()
        .and_then(|s| usize::from_str_radix(s, 16).ok())
        .unwrap_or_default();
    if len != 0 && len < LEN_PREFIX {
        return Err(GitError::InvalidPktLine(format!(
            "length {} too small at offset {}",
            len, offset
        )));
    }
    Ok(len)
}

fn strip_lf(data: &[u8]) -> &[u8] {
    data.strip_suffix(b"\n").unwrap_or(data)
}

/// Splits a buffer into packets.
///
/// A single trailing `\n` is removed from each data payload. A final line
/// whose declared length runs past the end of the buffer is dropped.
pub fn decode(bytes: &[u8]) -> Result<Vec<PktLine>> {
    let mut lines = Vec::new();
    let mut pos = 0;

    // Each packet consumes at least four bytes.
    for _ in 0..=bytes.len() / LEN_PREFIX {
        if pos + LEN_PREFIX > bytes.len() {
            break;
        }
        let len = parse_len(&bytes[pos..pos + LEN_PREFIX], pos)?;
        if len == 0 {
            lines.push(PktLine::Flush);
            pos += LEN_PREFIX;
            continue;
        }
        if pos + len > bytes.len() {
            break;
        }

        let data = strip_lf(&bytes[pos + LEN_PREFIX..pos + len]);
        lines.push(PktLine::Data(data.to_vec()));
        pos += len;
    }

    Ok(lines)
}

/// Reader for pkt-line format over a byte stream.
///
/// Applies the same rules as [`decode`], except that a stream ending inside
/// a packet is an error rather than silently dropped.
pub struct PktLineReader<R> {
    reader: R,
    offset: usize,
}

impl<R: Read> PktLineReader<R> {
    /// Creates a new pkt-line reader.
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    /// Reads the next packet, or `None` at a clean end of stream.
    pub fn read(&mut self) -> Result<Option<PktLine>> {
        let mut len_buf = [0u8; LEN_PREFIX];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = parse_len(&len_buf, self.offset)?;
        if len == 0 {
            self.offset += LEN_PREFIX;
            return Ok(Some(PktLine::Flush));
        }

        let mut data = vec![0u8; len - LEN_PREFIX];
        self.reader.read_exact(&mut data).map_err(|e| {
            GitError::InvalidPktLine(format!("packet at offset {} cut short: {}", self.offset, e))
        })?;
        self.offset += len;

        let payload_len = strip_lf(&data).len();
        data.truncate(payload_len);
        Ok(Some(PktLine::Data(data)))
    }

    /// Reads all packets until a flush packet.
    pub fn read_until_flush(&mut self) -> Result<Vec<PktLine>> {
        let mut packets = Vec::new();
        while let Some(pkt) = self.read()? {
            if pkt.is_flush() {
                break;
            }
            packets.push(pkt);
        }
        Ok(packets)
    }

    /// Returns a mutable reference to the inner reader.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }
}

/// Writer for pkt-line format.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    /// Creates a new pkt-line writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a packet.
    pub fn write(&mut self, pkt: &PktLine) -> Result<()> {
        self.writer.write_all(&pkt.encode()?)?;
        Ok(())
    }

    /// Writes a data line verbatim.
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.write(&PktLine::Data(data.to_vec()))
    }

    /// Writes a data line followed by `\n`.
    pub fn write_data_line(&mut self, data: &[u8]) -> Result<()> {
        let mut line = Vec::with_capacity(data.len() + 1);
        line.extend_from_slice(data);
        line.push(b'\n');
        self.write(&PktLine::Data(line))
    }

    /// Writes a string line (with newline).
    pub fn write_line(&mut self, s: &str) -> Result<()> {
        let mut data = s.as_bytes().to_vec();
        if !s.ends_with('\n') {
            data.push(b'\n');
        }
        self.write(&PktLine::Data(data))
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.write(&PktLine::Flush)
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pktline_encode() {
        assert_eq!(PktLine::from_string("hello\n").encode().unwrap(), b"000ahello\n");
        assert_eq!(PktLine::Flush.encode().unwrap(), b"0000");
    }

    #[test]
    fn test_pktline_empty_data() {
        let encoded = PktLine::from_bytes(Vec::new()).encode().unwrap();
        assert_eq!(encoded, b"0004");
    }

    #[test]
    fn test_pktline_too_long() {
        let pkt = PktLine::from_bytes(vec![b'x'; MAX_PKT_LEN]);
        assert!(matches!(pkt.encode(), Err(GitError::InvalidPktLine(_))));
        let pkt = PktLine::from_bytes(vec![b'x'; MAX_PKT_LEN - 4]);
        assert!(pkt.encode().is_ok());
    }

    #[test]
    fn test_encode_appends_newline_and_flush() {
        let encoded = encode(&[b"hello".as_slice(), b"world".as_slice()]).unwrap();
        assert_eq!(encoded, b"000ahello\n000aworld\n0000");
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode::<&[u8]>(&[]).unwrap(), b"0000");
    }

    #[test]
    fn test_decode_service_advertisement() {
        let data = b"001f# service=git-receive-pack\n0000";
        let lines = decode(data).unwrap();
        assert_eq!(
            lines,
            vec![
                PktLine::from_string("# service=git-receive-pack"),
                PktLine::Flush
            ]
        );
    }

    #[test]
    fn test_decode_without_newline() {
        let lines = decode(b"0009hello0000").unwrap();
        assert_eq!(lines, vec![PktLine::from_string("hello"), PktLine::Flush]);
    }

    #[test]
    fn test_decode_stops_at_truncated_line() {
        let lines = decode(b"000ahello\n0010short").unwrap();
        assert_eq!(lines, vec![PktLine::from_string("hello")]);

        // A dangling partial prefix is ignored too.
        let lines = decode(b"0000000").unwrap();
        assert_eq!(lines, vec![PktLine::Flush]);
    }

    #[test]
    fn test_decode_invalid_prefix() {
        assert!(matches!(decode(b"zzzz"), Err(GitError::InvalidPktLine(_))));
        assert!(matches!(decode(b"+00a"), Err(GitError::InvalidPktLine(_))));
    }

    #[test]
    fn test_decode_length_too_small() {
        assert!(matches!(decode(b"0003"), Err(GitError::InvalidPktLine(_))));
        assert!(matches!(decode(b"0001"), Err(GitError::InvalidPktLine(_))));
    }

    #[test]
    fn test_decode_uppercase_hex() {
        let mut data = b"001A".to_vec();
        data.extend_from_slice(&[b'y'; 0x1a - 4]);
        let lines = decode(&data).unwrap();
        assert_eq!(lines[0].data().unwrap().len(), 0x1a - 4);
    }

    #[test]
    fn test_decode_keeps_binary_payload() {
        let lines = decode(b"000bab\0cd\n\n").unwrap();
        assert_eq!(lines, vec![PktLine::from_bytes(b"ab\0cd\n".to_vec())]);
    }

    #[test]
    fn test_reader_matches_decode() {
        let data = b"001f# service=git-receive-pack\n00000009hello0000";
        let mut reader = PktLineReader::new(&data[..]);
        assert_eq!(
            reader.read_until_flush().unwrap(),
            vec![PktLine::from_string("# service=git-receive-pack")]
        );
        assert_eq!(reader.read_until_flush().unwrap(), vec![PktLine::from_string("hello")]);
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn test_reader_leaves_trailing_bytes() {
        let mut data = encode(&[b"command".as_slice()]).unwrap();
        data.extend_from_slice(b"PACK...");
        let mut reader = PktLineReader::new(&data[..]);
        assert_eq!(reader.read_until_flush().unwrap().len(), 1);

        let mut rest = Vec::new();
        reader.inner_mut().read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"PACK...");
    }

    #[test]
    fn test_reader_truncated_packet() {
        let mut reader = PktLineReader::new(&b"0010short"[..]);
        assert!(matches!(reader.read(), Err(GitError::InvalidPktLine(_))));
    }

    #[test]
    fn test_pktline_as_str() {
        assert_eq!(PktLine::from_string("hello\n").as_str(), Some("hello"));
        assert_eq!(PktLine::from_string("no newline").as_str(), Some("no newline"));
        assert!(PktLine::from_bytes(vec![0xff, 0xfe]).as_str().is_none());
        assert!(PktLine::Flush.as_str().is_none());
    }

    #[test]
    fn test_pktline_is_flush() {
        assert!(PktLine::Flush.is_flush());
        assert!(!PktLine::from_string("test").is_flush());
    }

    #[test]
    fn test_pktline_writer_write_line() {
        let mut writer = PktLineWriter::new(Vec::new());
        writer.write_line("test").unwrap();
        writer.write_line("test\n").unwrap();
        // "test\n" is 5 bytes, + 4 for length = 9; no doubled newline.
        assert_eq!(writer.into_inner(), b"0009test\n0009test\n");
    }

    #[test]
    fn test_pktline_writer_write_data() {
        let mut writer = PktLineWriter::new(Vec::new());
        writer.write_data(b"binary\x00data").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.into_inner(), b"000fbinary\x00data");
    }
}
