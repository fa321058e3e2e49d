//! Framed I/O: CRLF lines with embedded literals.
//!
//! A response on the wire is a line, optionally followed by
//! `{n}` literal payloads and their continuation lines. `read_response`
//! assembles the whole unit so the parser always sees a complete response.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Cap on a single line, to bound memory against a hostile server.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Cap on a single literal.
const MAX_LITERAL_SIZE: u64 = 100 * 1024 * 1024;

/// Buffered reader/writer with IMAP framing.
///
/// Partial input accumulates in the stream itself, not in the read future,
/// so `read_response` is safe to race in `tokio::select!`: a dropped read
/// loses nothing and the next call resumes where the last one stopped.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
    write_timeout: Option<Duration>,
    /// Completed lines and literal bytes of the response in progress.
    response: Vec<u8>,
    /// The line in progress; once complete it includes its CRLF.
    line: Vec<u8>,
    /// Bytes of an announced literal not yet consumed.
    literal_remaining: u64,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            write_timeout: None,
            response: Vec::new(),
            line: Vec::new(),
            literal_remaining: 0,
        }
    }

    /// Bounds each write; a write exceeding the deadline fails with
    /// [`Error::Timeout`] and the connection must be discarded.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) {
        self.write_timeout = timeout;
    }

    /// Reads one complete response: a line plus any literals it announces.
    ///
    /// Cancel-safe. Every await point here is a `fill_buf`; bytes consumed
    /// from the reader are already stashed in `self`, so dropping the
    /// future mid-response leaves the stream in sync.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        loop {
            while self.literal_remaining > 0 {
                let buf = self.reader.fill_buf().await?;
                if buf.is_empty() {
                    return Err(unexpected_eof());
                }
                let available = u64::try_from(buf.len()).unwrap_or(u64::MAX);
                let take = self.literal_remaining.min(available);
                #[allow(clippy::cast_possible_truncation)]
                let take_usize = take as usize;
                self.response.extend_from_slice(&buf[..take_usize]);
                self.reader.consume(take_usize);
                self.literal_remaining -= take;
                // The literal is followed by the rest of its line.
            }

            self.read_line().await?;

            let literal_len = parse_literal_length(&self.line);
            self.response.append(&mut self.line);
            match literal_len {
                Some(len) if len > MAX_LITERAL_SIZE => {
                    return Err(Error::Protocol(format!(
                        "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
                    )));
                }
                Some(len) => self.literal_remaining = len,
                None => return Ok(std::mem::take(&mut self.response)),
            }
        }
    }

    /// Appends one complete CRLF-terminated line to `self.line`,
    /// accumulating partial chunks across calls.
    async fn read_line(&mut self) -> Result<()> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(unexpected_eof());
            }

            // The CRLF can straddle reads: a '\r' already accumulated and
            // the '\n' first in this chunk.
            let newline = if self.line.last() == Some(&b'\r') && buf[0] == b'\n' {
                Some(0)
            } else {
                find_crlf(buf).map(|pos| pos + 1)
            };

            match newline {
                Some(nl) => {
                    self.line.extend_from_slice(&buf[..=nl]);
                    self.reader.consume(nl + 1);
                    return Ok(());
                }
                None => {
                    let len = buf.len();
                    self.line.extend_from_slice(buf);
                    self.reader.consume(len);

                    if self.line.len() > MAX_LINE_LENGTH {
                        return Err(Error::Protocol("line too long".to_string()));
                    }
                }
            }
        }
    }

    /// Writes and flushes one command line.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        let timeout = self.write_timeout;
        let stream = self.reader.get_mut();
        let write = async {
            stream.write_all(&self.write_buffer).await?;
            stream.flush().await?;
            Ok::<(), Error>(())
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => write.await,
        }
    }

    /// Shared reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }

    /// Unwraps the stream, dropping any buffered input.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

fn unexpected_eof() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "connection closed",
    ))
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Matches `{n}\r\n` or `{n+}\r\n` at the end of a line.
fn parse_literal_length(line: &[u8]) -> Option<u64> {
    if !line.ends_with(b"\r\n") {
        return None;
    }

    let line = &line[..line.len() - 2];
    let open = line.iter().rposition(|&b| b == b'{')?;

    if !line.ends_with(b"}") {
        return None;
    }

    let num_start = open + 1;
    let num_end = if line.ends_with(b"+}") {
        line.len() - 2
    } else {
        line.len() - 1
    };
    if num_start >= num_end {
        return None;
    }

    let num_str = std::str::from_utf8(&line[num_start..num_end]).ok()?;
    num_str.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn crlf_detection() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"bare\n"), None);
        assert_eq!(find_crlf(b"bare\r"), None);
    }

    #[test]
    fn literal_length_at_end_of_line() {
        assert_eq!(parse_literal_length(b"BODY {123}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"BODY {123+}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(parse_literal_length(b"no literal\r\n"), None);
        assert_eq!(parse_literal_length(b"not a line {5}"), None);
        assert_eq!(parse_literal_length(b"wrong {abc}\r\n"), None);
        assert_eq!(parse_literal_length(b"empty {}\r\n"), None);
    }

    #[test]
    fn literal_length_is_64_bit() {
        assert_eq!(
            parse_literal_length(b"{4294967296}\r\n"),
            Some(4_294_967_296)
        );
    }

    #[tokio::test]
    async fn read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn read_spans_literal_and_tail() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {5}\r\n")
            .read(b"hello UID 7)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(&response[..], b"* 1 FETCH (BODY[] {5}\r\nhello UID 7)\r\n");
    }

    #[tokio::test]
    async fn literal_containing_crlf_does_not_split_response() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {7}\r\n")
            .read(b"a\r\nb\r\nc)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(&response[..], b"* 1 FETCH (BODY[] {7}\r\na\r\nb\r\nc)\r\n");
    }

    #[tokio::test]
    async fn crlf_split_across_reads() {
        let mock = Builder::new().read(b"* OK ready\r").read(b"\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* OK ready\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_read_keeps_partial_line() {
        let mock = Builder::new()
            .read(b"* 3 EXI")
            .wait(Duration::from_millis(50))
            .read(b"STS\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        // A caller dropping the read mid-line must not lose the prefix.
        let first = tokio::time::timeout(Duration::from_millis(10), framed.read_response()).await;
        assert!(first.is_err());

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 3 EXISTS\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_read_keeps_partial_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {5}\r\nhe")
            .wait(Duration::from_millis(50))
            .read(b"llo)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let first = tokio::time::timeout(Duration::from_millis(10), framed.read_response()).await;
        assert!(first.is_err());

        let response = framed.read_response().await.unwrap();
        assert_eq!(&response[..], b"* 1 FETCH (BODY[] {5}\r\nhello)\r\n");
    }

    #[tokio::test]
    async fn write_command_flushes() {
        let mock = Builder::new().write(b"R1 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);

        framed.write_command(b"R1 NOOP\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn eof_is_an_error() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);

        assert!(framed.read_response().await.is_err());
    }
}
