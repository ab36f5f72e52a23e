// src/exec/line_reader.rs

//! Line reader with a hard per-line ceiling.
//!
//! `AsyncBufReadExt::lines` would buffer an arbitrarily long line in memory.
//! This reader discards everything past `max_line_bytes` up to the next
//! line terminator and reports the overflow instead.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// [`BoundedLineReader::drain_to_end`] keeps at most this many ceilings' worth
/// of bytes.
const DRAIN_CAP_LINES: usize = 16;

/// Outcome of one [`BoundedLineReader::next_line`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    /// A complete line, terminator stripped, invalid UTF-8 replaced.
    Line(String),
    /// A line longer than the ceiling was dropped; `discarded` bytes lost.
    Overflow { discarded: usize },
    Eof,
}

pub struct BoundedLineReader<R> {
    inner: BufReader<R>,
    max_line_bytes: usize,
    buf: Vec<u8>,
    /// Bytes thrown away so far while skipping an oversized line.
    discarding: Option<usize>,
}

impl<R: AsyncRead + Unpin> BoundedLineReader<R> {
    pub fn new(inner: R, max_line_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            max_line_bytes,
            buf: Vec::new(),
            discarding: None,
        }
    }

    /// Read the next line.
    ///
    /// Cancel safe: all state lives in `self` and the only await point is
    /// `fill_buf`, which consumes nothing.
    pub async fn next_line(&mut self) -> io::Result<ReadLine> {
        loop {
            let available = self.inner.fill_buf().await?;

            if available.is_empty() {
                if let Some(discarded) = self.discarding.take() {
                    return Ok(ReadLine::Overflow { discarded });
                }
                if self.buf.is_empty() {
                    return Ok(ReadLine::Eof);
                }
                return Ok(ReadLine::Line(decode_line(std::mem::take(&mut self.buf))));
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let len = available.len();

            match newline {
                Some(idx) => {
                    let outcome = if let Some(discarded) = self.discarding.take() {
                        ReadLine::Overflow {
                            discarded: discarded + idx,
                        }
                    } else if self.buf.len() + idx > self.max_line_bytes {
                        let discarded = self.buf.len() + idx;
                        self.buf.clear();
                        ReadLine::Overflow { discarded }
                    } else {
                        self.buf.extend_from_slice(&available[..idx]);
                        ReadLine::Line(decode_line(std::mem::take(&mut self.buf)))
                    };
                    self.inner.consume(idx + 1);
                    return Ok(outcome);
                }
                None => {
                    if let Some(discarded) = self.discarding.as_mut() {
                        *discarded += len;
                    } else if self.buf.len() + len > self.max_line_bytes {
                        self.discarding = Some(self.buf.len() + len);
                        self.buf.clear();
                    } else {
                        self.buf.extend_from_slice(available);
                    }
                    self.inner.consume(len);
                }
            }
        }
    }

    /// Read what is left until EOF into the pending buffer, stopping once
    /// `max_line_bytes * 16` bytes are held.
    ///
    /// Meant to be wrapped in a timeout; whatever arrived before the
    /// timeout stays available through [`Self::take_pending`].
    pub async fn drain_to_end(&mut self) -> io::Result<()> {
        self.discarding = None;
        let cap = self.max_line_bytes.saturating_mul(DRAIN_CAP_LINES);
        let mut chunk = [0u8; 8192];
        while self.buf.len() < cap {
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            let room = cap - self.buf.len();
            self.buf.extend_from_slice(&chunk[..n.min(room)]);
        }
        Ok(())
    }

    /// Take bytes buffered but not yet returned as a line.
    pub fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

/// Split recovered bytes into lines, applying the same ceiling.
/// Empty lines are skipped.
pub fn split_lines(bytes: &[u8], max_line_bytes: usize) -> Vec<ReadLine> {
    bytes
        .split(|&b| b == b'\n')
        .filter_map(|chunk| {
            if chunk.is_empty() {
                None
            } else if chunk.len() > max_line_bytes {
                Some(ReadLine::Overflow {
                    discarded: chunk.len(),
                })
            } else {
                Some(ReadLine::Line(decode_line(chunk.to_vec())))
            }
        })
        .collect()
}

fn decode_line(mut bytes: Vec<u8>) -> String {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
