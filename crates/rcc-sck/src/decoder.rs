//! ---
//! rcc_section: "02-messaging-ipc-data-model"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Streaming decoder for mixed binary and text input."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::frame::{declared_frame_len, decode_frame, Frame, STX};
use crate::text::{line_limit, parse_line, LegacyTextCommand, TextLine};
use crate::{DecodeError, FramingFault, TextParseError};

/// Consecutive empty polls before an unfinished binary frame is abandoned.
pub const DEFAULT_STALL_LIMIT: u32 = 8;

/// How a frame reached us. Replies go back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameEncoding {
    Binary,
    HexLine,
}

/// Input that decoded cleanly but needs no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// A response line echoed back by the peer.
    Echo,
    Blank,
    /// Bytes that could start neither a frame nor a line.
    Noise(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Frame { frame: Frame, encoding: FrameEncoding },
    Text(LegacyTextCommand),
    Ignored(Ignored),
}

fn starts_line(byte: u8) -> bool {
    byte.is_ascii_graphic() || matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

/// Decode the first item in `buf` without keeping any state.
///
/// The first byte picks the path: STX selects the binary frame decoder,
/// printable ASCII or whitespace starts a newline-terminated line, anything
/// else is reported as noise up to the next byte that could start either.
/// Returns the item and the bytes it consumed. Partial input yields
/// [`DecodeError::Incomplete`] and consumes nothing.
pub fn decode(buf: &[u8]) -> Result<(Decoded, usize), DecodeError> {
    let Some(&first) = buf.first() else {
        return Err(DecodeError::Incomplete { needed: None });
    };

    if first == STX {
        let (frame, used) = decode_frame(buf)?;
        return Ok((
            Decoded::Frame {
                frame,
                encoding: FrameEncoding::Binary,
            },
            used,
        ));
    }

    if !starts_line(first) {
        let run = buf
            .iter()
            .position(|&b| b == STX || starts_line(b))
            .unwrap_or(buf.len());
        return Ok((Decoded::Ignored(Ignored::Noise(run)), run));
    }

    match buf.iter().position(|&b| b == b'\n' || b == STX) {
        Some(end) if buf[end] == b'\n' => {
            let decoded = match parse_line(&buf[..end])? {
                TextLine::Command(command) => Decoded::Text(command),
                TextLine::Frame(frame) => Decoded::Frame {
                    frame,
                    encoding: FrameEncoding::HexLine,
                },
                TextLine::Echo => Decoded::Ignored(Ignored::Echo),
                TextLine::Blank => Decoded::Ignored(Ignored::Blank),
            };
            Ok((decoded, end + 1))
        }
        Some(stx) => Ok((Decoded::Ignored(Ignored::Noise(stx)), stx)),
        None if buf.len() > line_limit(buf) => {
            Err(TextParseError::LineTooLong(buf.len()).into())
        }
        None => Err(DecodeError::Incomplete { needed: None }),
    }
}

/// Buffers bytes from a UART and yields decoded items, resynchronising after
/// malformed input.
///
/// A frame with a bad checksum is skipped whole. Other binary failures drop
/// the leading STX and resume at the next STX or after the next newline. A partial binary frame that receives no new bytes for
/// `stall_limit` consecutive polls is abandoned the same way, so a truncated
/// frame cannot wedge the channel.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    stall_limit: u32,
    stalled_polls: u32,
    fresh_input: bool,
    discarding_line: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_stall_limit(DEFAULT_STALL_LIMIT)
    }

    pub fn with_stall_limit(stall_limit: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            stall_limit: stall_limit.max(1),
            stalled_polls: 0,
            fresh_input: false,
            discarding_line: false,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(bytes);
        self.fresh_input = true;
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Next decoded item, or `None` when the buffer holds nothing complete.
    ///
    /// Call repeatedly after each [`FrameDecoder::extend`] until it returns
    /// `None`; each `None` on a partial binary frame counts as one stalled poll.
    pub fn next_item(&mut self) -> Option<Result<Decoded, DecodeError>> {
        if self.discarding_line && !self.discard_rest_of_line() {
            return None;
        }
        if self.buffer.is_empty() {
            return None;
        }

        match decode(&self.buffer) {
            Ok((item, used)) => {
                self.buffer.advance(used);
                self.stalled_polls = 0;
                Some(Ok(item))
            }
            Err(DecodeError::Incomplete { .. }) => self.note_incomplete(),
            Err(DecodeError::UnsupportedVersion { frame }) => {
                self.buffer.advance(frame.encoded_len().min(self.buffer.len()));
                self.stalled_polls = 0;
                Some(Err(DecodeError::UnsupportedVersion { frame }))
            }
            Err(err @ DecodeError::Checksum { .. }) => {
                // boundaries were confirmed by the trailer, only the contents are bad
                let len = declared_frame_len(&self.buffer).unwrap_or(1);
                self.buffer.advance(len.min(self.buffer.len()));
                self.stalled_polls = 0;
                Some(Err(err))
            }
            Err(err @ DecodeError::TextParse(_)) => {
                self.skip_line();
                Some(Err(err))
            }
            Err(err) => {
                debug!(
                    error = %err,
                    buffered = self.buffer.len(),
                    "resynchronising after binary error"
                );
                self.skip_frame();
                Some(Err(err))
            }
        }
    }

    fn note_incomplete(&mut self) -> Option<Result<Decoded, DecodeError>> {
        if self.buffer.first() != Some(&STX) {
            return None;
        }
        if std::mem::take(&mut self.fresh_input) {
            self.stalled_polls = 0;
            return None;
        }
        self.stalled_polls += 1;
        trace!(stalled = self.stalled_polls, "partial frame waiting for bytes");
        if self.stalled_polls < self.stall_limit {
            return None;
        }
        let buffered = self.buffer.len();
        self.skip_frame();
        Some(Err(FramingFault::Stalled { buffered }.into()))
    }

    /// Drop the leading STX and everything up to the next STX or through the
    /// next newline.
    fn skip_frame(&mut self) {
        self.stalled_polls = 0;
        let next = self.buffer[1..]
            .iter()
            .position(|&b| b == STX || b == b'\n')
            .map(|offset| offset + 1);
        match next {
            Some(idx) if self.buffer[idx] == b'\n' => self.buffer.advance(idx + 1),
            Some(idx) => self.buffer.advance(idx),
            None => self.buffer.clear(),
        }
    }

    fn skip_line(&mut self) {
        match self.buffer.iter().position(|&b| b == b'\n' || b == STX) {
            Some(idx) if self.buffer[idx] == b'\n' => self.buffer.advance(idx + 1),
            Some(idx) => self.buffer.advance(idx),
            None => {
                self.buffer.clear();
                self.discarding_line = true;
            }
        }
    }

    /// Returns `true` once the tail of an over-long line has been dropped.
    fn discard_rest_of_line(&mut self) -> bool {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(idx) => {
                self.buffer.advance(idx + 1);
                self.discarding_line = false;
                true
            }
            None => {
                self.buffer.clear();
                false
            }
        }
    }
}
