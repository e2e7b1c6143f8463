//! ---
//! rcc_section: "02-messaging-ipc-data-model"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "SCK frame codec."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
//! Binary SCK frame layout:
//!
//! ```text
//! STX | VERSION(2,LE) | LENGTH(2,LE) | TID | ROLE | CMD(2,LE) | PAYLOAD(N) | CRC16(2,LE) | ETX
//! ```
//!
//! `LENGTH = 1 + 2 + N` counts ROLE, CMD and PAYLOAD.

use std::borrow::Cow;

use strum::FromRepr;

use crate::crc::crc16;
use crate::{DecodeError, EncodeError, FramingFault};

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;

/// The only protocol version this controller speaks.
pub const SUPPORTED_VERSION: u16 = 0x0420;

/// Smallest LENGTH value: role byte plus command id, empty payload.
pub const MIN_LENGTH: usize = 3;
/// Largest LENGTH value accepted on the wire.
pub const MAX_LENGTH: usize = 1023;
pub const MAX_PAYLOAD: usize = MAX_LENGTH - MIN_LENGTH;

/// Bytes surrounding the LENGTH-counted region: STX, VERSION, LENGTH, TID, CRC, ETX.
pub const FRAME_OVERHEAD: usize = 9;

const HEADER_LEN: usize = 5;
const TID_OFFSET: usize = 5;
const ROLE_OFFSET: usize = 6;
const PAYLOAD_OFFSET: usize = 9;

/// Direction marker carried in every frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Command = b'C',
    Status = b'S',
}

impl TryFrom<u8> for Role {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'C' => Ok(Role::Command),
            b'S' => Ok(Role::Status),
            other => Err(other),
        }
    }
}

/// Command identifiers understood by the controller.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
pub enum CommandId {
    SetConfig = 0x0001,
    GetConfig = 0x0002,
    GetStatus = 0x0003,
    SetSensor = 0x0101,
    SetInput = 0x0102,
    GetIo = 0x0103,
}

impl CommandId {
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl From<CommandId> for u16 {
    fn from(command: CommandId) -> Self {
        command.code()
    }
}

/// A decoded SCK frame. `command` stays raw so unknown ids round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u16,
    pub tid: u8,
    pub role: Role,
    pub command: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new_command(tid: u8, command: impl Into<u16>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            version: SUPPORTED_VERSION,
            tid,
            role: Role::Command,
            command: command.into(),
            payload: payload.into(),
        }
    }

    pub fn new_status(tid: u8, command: impl Into<u16>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            role: Role::Status,
            ..Self::new_command(tid, command, payload)
        }
    }

    /// Status frame answering this one: same TID and command id.
    pub fn reply(&self, payload: impl Into<Vec<u8>>) -> Self {
        Self::new_status(self.tid, self.command, payload)
    }

    pub fn command_id(&self) -> Option<CommandId> {
        CommandId::from_repr(self.command)
    }

    /// Value of the LENGTH field for this frame.
    pub fn length_field(&self) -> usize {
        MIN_LENGTH + self.payload.len()
    }

    /// Total bytes on the wire.
    pub fn encoded_len(&self) -> usize {
        self.length_field() + FRAME_OVERHEAD
    }

    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Serialise a frame, recomputing LENGTH and CRC from the payload.
pub fn encode(frame: &Frame) -> Result<Vec<u8>, EncodeError> {
    if frame.payload.len() > MAX_PAYLOAD {
        return Err(EncodeError::PayloadTooLarge {
            len: frame.payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    let length = frame.length_field() as u16;
    let mut out = Vec::with_capacity(frame.encoded_len());
    out.push(STX);
    out.extend_from_slice(&frame.version.to_le_bytes());
    out.extend_from_slice(&length.to_le_bytes());
    out.push(frame.tid);
    out.push(frame.role as u8);
    out.extend_from_slice(&frame.command.to_le_bytes());
    out.extend_from_slice(&frame.payload);
    let crc = crc16(&[&out[3..TID_OFFSET], &out[ROLE_OFFSET..]]);
    out.extend_from_slice(&crc.to_le_bytes());
    out.push(ETX);
    Ok(out)
}

/// Total wire size announced by the LENGTH field of a buffered header.
pub(crate) fn declared_frame_len(buf: &[u8]) -> Option<usize> {
    let length = u16::from_le_bytes([*buf.get(3)?, *buf.get(4)?]) as usize;
    Some(length + FRAME_OVERHEAD)
}

/// Decode one binary frame from the start of `buf`.
///
/// Returns the frame and the number of bytes it occupied. A buffer that
/// holds only part of a frame yields [`DecodeError::Incomplete`]; nothing is
/// consumed in that case and the caller should retry once more bytes arrive.
pub fn decode_frame(buf: &[u8]) -> Result<(Frame, usize), DecodeError> {
    let Some(&first) = buf.first() else {
        return Err(DecodeError::Incomplete { needed: None });
    };
    if first != STX {
        return Err(FramingFault::MissingHeader(first).into());
    }
    if buf.len() < HEADER_LEN {
        return Err(DecodeError::Incomplete {
            needed: Some(HEADER_LEN - buf.len()),
        });
    }

    let version = u16::from_le_bytes([buf[1], buf[2]]);
    let length = u16::from_le_bytes([buf[3], buf[4]]) as usize;
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
        return Err(FramingFault::InvalidLength(length).into());
    }

    let total = length + FRAME_OVERHEAD;
    if buf.len() < total {
        return Err(DecodeError::Incomplete {
            needed: Some(total - buf.len()),
        });
    }

    let trailer = buf[total - 1];
    if trailer != ETX {
        return Err(FramingFault::MissingTrailer(trailer).into());
    }

    let tid = buf[TID_OFFSET];
    let command = u16::from_le_bytes([buf[ROLE_OFFSET + 1], buf[ROLE_OFFSET + 2]]);
    let payload_end = total - 3;
    let received = u16::from_le_bytes([buf[payload_end], buf[payload_end + 1]]);
    let computed = crc16(&[&buf[3..TID_OFFSET], &buf[ROLE_OFFSET..payload_end]]);
    if received != computed {
        return Err(DecodeError::Checksum {
            tid,
            command,
            received,
            computed,
        });
    }

    let role = Role::try_from(buf[ROLE_OFFSET]).map_err(FramingFault::UnknownRole)?;
    let frame = Frame {
        version,
        tid,
        role,
        command,
        payload: buf[PAYLOAD_OFFSET..payload_end].to_vec(),
    };
    if version != SUPPORTED_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            frame: Box::new(frame),
        });
    }
    Ok((frame, total))
}
