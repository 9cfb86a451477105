//! Line reassembly codec for endpoint streams.
//!
//! Remote shells write output in arbitrary chunks, so a read may end in the
//! middle of a tagged line. [`TaggedLineCodec`] keeps the partial fragment
//! buffered until its `\n` arrives, so the marker is always seen together
//! with its body.
//!
//! Unlike [`tokio_util::codec::LinesCodec`], the codec never fails: invalid
//! UTF-8 is replaced lossily and oversized lines are dropped with a warning.
//! A decoder error would terminate the [`FramedRead`](tokio_util::codec::FramedRead)
//! stream, and that must only happen on a transport failure.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::{AppError, Result};

/// Maximum accepted line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline framing with lossy UTF-8 and a bounded line length.
#[derive(Debug)]
pub struct TaggedLineCodec {
    max_length: usize,
    /// Bytes of the buffer already scanned without finding `\n`.
    next_index: usize,
    /// Set while skipping the remainder of an oversized line.
    discarding: bool,
}

impl TaggedLineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

impl Default for TaggedLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TaggedLineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_length {
                    if !self.discarding {
                        warn!(
                            limit = self.max_length,
                            "inbound line exceeds limit, discarding"
                        );
                    }
                    self.discarding = true;
                    src.clear();
                    self.next_index = 0;
                } else {
                    self.next_index = src.len();
                }
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;
            let line = src.split_to(end + 1);

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if end > self.max_length {
                warn!(
                    limit = self.max_length,
                    len = end,
                    "inbound line exceeds limit, discarding"
                );
                continue;
            }

            return Ok(Some(line_to_string(&line[..end])));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        self.next_index = 0;
        if src.is_empty() || self.discarding {
            self.discarding = false;
            src.clear();
            return Ok(None);
        }

        let rest = src.split_to(src.len());
        Ok(Some(line_to_string(&rest)))
    }
}

fn line_to_string(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
