//! ---
//! rcc_section: "02-messaging-ipc-data-model"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "SCK frame codec."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
//! Wire formats spoken on the controller's UART channels.
//!
//! Three encodings share one byte stream:
//! binary SCK frames, the same frames rendered as `SCK xx xx ..` hex lines,
//! and newline-terminated legacy text commands. [`FrameDecoder`] separates
//! them and resynchronises after garbage.

pub mod crc;
pub mod decoder;
pub mod frame;
pub mod text;

use thiserror::Error;

pub use decoder::{decode, Decoded, FrameDecoder, FrameEncoding, Ignored};
pub use frame::{
    decode_frame, encode, CommandId, Frame, Role, ETX, MAX_LENGTH, MAX_PAYLOAD, MIN_LENGTH, STX,
    SUPPORTED_VERSION,
};
pub use text::{format_hex_line, parse_hex_line, parse_line, LegacyTextCommand, TextLine};

/// Structural faults that prevent a frame from being recognised at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingFault {
    #[error("expected STX, found 0x{0:02X}")]
    MissingHeader(u8),
    #[error("expected ETX, found 0x{0:02X}")]
    MissingTrailer(u8),
    #[error("length field {0} outside {min}..={max}", min = MIN_LENGTH, max = MAX_LENGTH)]
    InvalidLength(usize),
    #[error("unknown role byte 0x{0:02X}")]
    UnknownRole(u8),
    #[error("partial frame stalled with {buffered} bytes buffered")]
    Stalled { buffered: usize },
    #[error("frame ends before its declared length")]
    Truncated,
    #[error("{0} bytes follow the frame trailer")]
    TrailingBytes(usize),
}

/// Problems with a newline-terminated text line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextParseError {
    #[error("line is not valid UTF-8")]
    NotUtf8,
    #[error("unknown verb `{0}`")]
    UnknownVerb(String),
    #[error("`{0}` requires an argument")]
    MissingArgument(&'static str),
    #[error("unknown target `{0}`")]
    UnknownTarget(String),
    #[error("line of {0} bytes exceeds the text limit")]
    LineTooLong(usize),
    #[error("invalid hex token `{0}`")]
    InvalidHex(String),
    #[error("hex line does not hold a valid frame: {0}")]
    HexFrame(Box<DecodeError>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// More bytes are needed before anything can be decided.
    #[error("incomplete input")]
    Incomplete { needed: Option<usize> },
    #[error("framing error: {0}")]
    Framing(#[from] FramingFault),
    #[error("checksum mismatch on tid {tid} cmd 0x{command:04X}: received 0x{received:04X}, computed 0x{computed:04X}")]
    Checksum {
        tid: u8,
        command: u16,
        received: u16,
        computed: u16,
    },
    /// Structurally valid frame carrying a version other than [`SUPPORTED_VERSION`].
    #[error("unsupported protocol version 0x{:04X}", .frame.version)]
    UnsupportedVersion { frame: Box<Frame> },
    #[error("text parse error: {0}")]
    TextParse(#[from] TextParseError),
}

/// Identity of the request a decode error belongs to, when it is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correlation {
    pub tid: u8,
    pub command: u16,
    pub encoding: FrameEncoding,
}

impl DecodeError {
    /// TID and command id of the offending frame for errors that still
    /// carry enough header to be answered.
    pub fn correlation(&self) -> Option<Correlation> {
        self.correlation_with(FrameEncoding::Binary)
    }

    fn correlation_with(&self, encoding: FrameEncoding) -> Option<Correlation> {
        match self {
            DecodeError::Checksum { tid, command, .. } => Some(Correlation {
                tid: *tid,
                command: *command,
                encoding,
            }),
            DecodeError::UnsupportedVersion { frame } => Some(Correlation {
                tid: frame.tid,
                command: frame.command,
                encoding,
            }),
            DecodeError::TextParse(TextParseError::HexFrame(inner)) => {
                inner.correlation_with(FrameEncoding::HexLine)
            }
            _ => None,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecodeError::Incomplete { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
}
