//! Newline-delimited text transport
//!
//! A connection is split into a [`LineReader`] and a [`LineWriter`] so the
//! receive side and the write side can be owned by different tasks.

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::{ProtocolError, Result};
use crate::validation::MessageValidator;

/// Result of a single line read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A decoded line with its terminator removed
    Line(String),
    /// The line went past the reader's byte limit and was discarded
    Oversized,
    /// The peer closed its side of the stream
    Eof,
}

/// Strip any trailing `\r` / `\n` characters
pub fn strip_line_ending(text: &str) -> &str {
    text.trim_end_matches(['\r', '\n'])
}

/// Split a TCP stream into line-oriented halves using the default line limit
pub fn split(stream: TcpStream) -> (LineReader<OwnedReadHalf>, LineWriter<OwnedWriteHalf>) {
    split_with_limit(stream, MessageValidator::default().max_line_bytes())
}

/// Split a TCP stream, capping every incoming line at `max_line_bytes`
/// (terminator included)
pub fn split_with_limit(
    stream: TcpStream,
    max_line_bytes: usize,
) -> (LineReader<OwnedReadHalf>, LineWriter<OwnedWriteHalf>) {
    let (read_half, write_half) = stream.into_split();
    (
        LineReader::with_limit(read_half, max_line_bytes),
        LineWriter::new(write_half),
    )
}

/// Buffered line reader with a per-line byte limit
pub struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    max_line_bytes: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_limit(inner, MessageValidator::default().max_line_bytes())
    }

    pub fn with_limit(inner: R, max_line_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            buf: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    pub fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    /// Read the next line.
    ///
    /// Returns [`ReadOutcome::Eof`] once the peer has closed the stream. A
    /// final unterminated fragment before EOF is still returned as a line.
    /// At most `max_line_bytes` are buffered; anything longer is skipped up
    /// to its `\n` and reported as [`ReadOutcome::Oversized`].
    pub async fn read_line(&mut self) -> Result<ReadOutcome> {
        self.buf.clear();
        let limit = self.max_line_bytes as u64;
        let n = (&mut self.inner)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;

        if n == 0 {
            return Ok(ReadOutcome::Eof);
        }

        if self.buf.last() != Some(&b'\n') && n as u64 == limit {
            self.discard_rest_of_line().await?;
            return Ok(ReadOutcome::Oversized);
        }

        let line = std::str::from_utf8(&self.buf).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok(ReadOutcome::Line(strip_line_ending(line).to_string()))
    }

    /// Drop buffered input up to and including the next `\n` (or EOF).
    async fn discard_rest_of_line(&mut self) -> Result<()> {
        loop {
            let (consumed, done) = {
                let available = self.inner.fill_buf().await?;
                if available.is_empty() {
                    return Ok(());
                }
                match available.iter().position(|b| *b == b'\n') {
                    Some(idx) => (idx + 1, true),
                    None => (available.len(), false),
                }
            };

            self.inner.consume(consumed);
            if done {
                return Ok(());
            }
        }
    }
}

/// Line writer that flushes after every line
pub struct LineWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write `text` followed by exactly one `\n`, then flush.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        let body = strip_line_ending(text);
        let mut framed = String::with_capacity(body.len() + 1);
        framed.push_str(body);
        framed.push('\n');

        self.inner.write_all(framed.as_bytes()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Close the write direction. Already-closed sockets are not an error.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.inner.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
