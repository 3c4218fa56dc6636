//! Byte-chunk-to-line adapter (component C1).
//!
//! Turns a sequence of byte chunks into a lazy sequence of logical UTF-8
//! lines, handling the three legal SSE line terminators (`\n`, `\r\n`, bare
//! `\r`), a possible chunk boundary splitting a terminator, and an optional
//! leading UTF-8 BOM.

use async_stream::stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::SseError;

const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Resumable line-splitting state machine. No recursion; all state lives in
/// `buf` plus the two flags below.
pub(crate) struct LineReader {
    buf: Vec<u8>,
    bom_checked: bool,
}

impl LineReader {
    pub fn new() -> Self {
        LineReader {
            buf: Vec::new(),
            bom_checked: false,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Resolves the leading-BOM question exactly once, on the first bytes
    /// the stream ever produces. Returns `false` while the question is still
    /// ambiguous (fewer than 3 bytes buffered, none of them yet, and not
    /// `eof`) -- the caller must wait for more bytes rather than popping a
    /// line, or a later chunk that happens to start with `EF BB BF` would be
    /// mistaken for a stream-leading BOM.
    fn maybe_strip_bom(&mut self, eof: bool) -> bool {
        if self.bom_checked {
            return true;
        }
        if self.buf.len() >= 3 {
            if self.buf[..3] == BOM {
                self.buf.drain(..3);
            }
            self.bom_checked = true;
            true
        } else if eof {
            // Fewer than 3 bytes ever arrived; can't be a full BOM.
            self.bom_checked = true;
            true
        } else if self.buf[..] != BOM[..self.buf.len()] {
            // What's buffered so far isn't a BOM prefix; resolved for good.
            self.bom_checked = true;
            true
        } else {
            false
        }
    }

    /// Attempt to pull one complete line out of the buffer. `eof` indicates
    /// no more chunks will ever be fed, which resolves the "bare CR at the
    /// end of the buffer" ambiguity and makes any remaining bytes a final
    /// unterminated line.
    pub fn pop_line(&mut self, eof: bool) -> Option<String> {
        if !self.maybe_strip_bom(eof) {
            return None;
        }

        let mut i = 0;
        while i < self.buf.len() {
            match self.buf[i] {
                b'\n' => {
                    let line = decode(&self.buf[..i]);
                    self.buf.drain(..=i);
                    return Some(line);
                }
                b'\r' => {
                    if i + 1 < self.buf.len() {
                        let consumed = if self.buf[i + 1] == b'\n' { i + 2 } else { i + 1 };
                        let line = decode(&self.buf[..i]);
                        self.buf.drain(..consumed);
                        return Some(line);
                    } else if eof {
                        let line = decode(&self.buf[..i]);
                        self.buf.drain(..=i);
                        return Some(line);
                    } else {
                        // Ambiguous: a following '\n' may still arrive. Wait.
                        return None;
                    }
                }
                _ => i += 1,
            }
        }

        if eof && !self.buf.is_empty() {
            let line = decode(&self.buf);
            self.buf.clear();
            return Some(line);
        }

        None
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Adapts a stream of byte chunks into a stream of logical lines.
pub(crate) fn lines<S>(mut chunks: S) -> impl Stream<Item = Result<String, SseError>>
where
    S: Stream<Item = Result<Bytes, SseError>> + Unpin,
{
    stream! {
        let mut reader = LineReader::new();
        loop {
            while let Some(line) = reader.pop_line(false) {
                yield Ok(line);
            }

            match chunks.next().await {
                Some(Ok(chunk)) => reader.feed(&chunk),
                Some(Err(e)) => {
                    yield Err(e);
                    return;
                }
                None => {
                    while let Some(line) = reader.pop_line(true) {
                        yield Ok(line);
                    }
                    return;
                }
            }
        }
    }
}
