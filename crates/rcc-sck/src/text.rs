//! ---
//! rcc_section: "02-messaging-ipc-data-model"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Legacy text protocol and SCK hex lines."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
//! Line-oriented side of the protocol.
//!
//! A line is either a legacy `VERB ARGS` command, an `SCK ..` hex rendering
//! of a binary frame, or an echoed response from a peer that must be ignored.

use std::fmt::Write as _;

use crate::frame::{decode_frame, encode, CommandId, Frame, FRAME_OVERHEAD, MAX_LENGTH};
use crate::{DecodeError, EncodeError, TextParseError};

/// Longest accepted legacy command line, terminator excluded.
pub const MAX_LINE_LEN: usize = 512;

pub const HEX_LINE_PREFIX: &str = "SCK";

/// Longest accepted hex line: the prefix, three characters per byte of a
/// maximum-size frame, and a little room for trailing whitespace.
pub const MAX_HEX_LINE_LEN: usize = HEX_LINE_PREFIX.len() + 3 * (MAX_LENGTH + FRAME_OVERHEAD) + 4;

/// Length limit for a line that starts with `line`.
pub fn line_limit(line: &[u8]) -> usize {
    if line.trim_ascii_start().starts_with(HEX_LINE_PREFIX.as_bytes()) {
        MAX_HEX_LINE_LEN
    } else {
        MAX_LINE_LEN
    }
}

/// Response keywords a controller emits. Lines starting with these are
/// echoes from the other end of the wire.
const RESPONSE_PREFIXES: [&str; 5] = ["ACK ", "ERR ", "STATUS ", "CONFIG ", "IO "];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyTextCommand {
    /// `SET key=value`
    SetConfig(String),
    /// `GET CONFIG`
    GetConfig,
    /// `GET STATUS`
    GetStatus,
    /// `SET_SENSOR key=value`
    SetSensor(String),
    /// `SET_INPUT key=value`
    SetInput(String),
    /// `GET IO`
    GetIo,
}

impl LegacyTextCommand {
    /// Binary command id this verb maps to.
    pub fn command_id(&self) -> CommandId {
        match self {
            LegacyTextCommand::SetConfig(_) => CommandId::SetConfig,
            LegacyTextCommand::GetConfig => CommandId::GetConfig,
            LegacyTextCommand::GetStatus => CommandId::GetStatus,
            LegacyTextCommand::SetSensor(_) => CommandId::SetSensor,
            LegacyTextCommand::SetInput(_) => CommandId::SetInput,
            LegacyTextCommand::GetIo => CommandId::GetIo,
        }
    }

    /// The argument text, empty for the `GET` verbs.
    pub fn payload(&self) -> &str {
        match self {
            LegacyTextCommand::SetConfig(arg)
            | LegacyTextCommand::SetSensor(arg)
            | LegacyTextCommand::SetInput(arg) => arg,
            LegacyTextCommand::GetConfig
            | LegacyTextCommand::GetStatus
            | LegacyTextCommand::GetIo => "",
        }
    }
}

/// Classification of one complete line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextLine {
    Command(LegacyTextCommand),
    Frame(Frame),
    Echo,
    Blank,
}

/// Classify a single line. Trailing `\r`/`\n` and surrounding whitespace are
/// ignored; verbs are case-sensitive.
pub fn parse_line(raw: &[u8]) -> Result<TextLine, TextParseError> {
    if raw.len() > line_limit(raw) {
        return Err(TextParseError::LineTooLong(raw.len()));
    }
    let line = std::str::from_utf8(raw)
        .map_err(|_| TextParseError::NotUtf8)?
        .trim();
    if line.is_empty() {
        return Ok(TextLine::Blank);
    }
    if let Some(frame) = parse_hex_line(line)? {
        return Ok(TextLine::Frame(frame));
    }
    if RESPONSE_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
        return Ok(TextLine::Echo);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let command = match verb {
        "SET" => LegacyTextCommand::SetConfig(required(rest, "SET")?),
        "SET_SENSOR" => LegacyTextCommand::SetSensor(required(rest, "SET_SENSOR")?),
        "SET_INPUT" => LegacyTextCommand::SetInput(required(rest, "SET_INPUT")?),
        "GET" => match rest {
            "CONFIG" => LegacyTextCommand::GetConfig,
            "STATUS" => LegacyTextCommand::GetStatus,
            "IO" => LegacyTextCommand::GetIo,
            "" => return Err(TextParseError::MissingArgument("GET")),
            other => return Err(TextParseError::UnknownTarget(other.to_string())),
        },
        other => return Err(TextParseError::UnknownVerb(other.to_string())),
    };
    Ok(TextLine::Command(command))
}

fn required(rest: &str, verb: &'static str) -> Result<String, TextParseError> {
    if rest.is_empty() {
        Err(TextParseError::MissingArgument(verb))
    } else {
        Ok(rest.to_string())
    }
}

/// Decode an `SCK xx xx ..` line. Returns `Ok(None)` when the line does not
/// carry the prefix at all.
pub fn parse_hex_line(line: &str) -> Result<Option<Frame>, TextParseError> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix(HEX_LINE_PREFIX) else {
        return Ok(None);
    };
    if !rest.starts_with(char::is_whitespace) {
        return Ok(None);
    }

    let mut bytes = Vec::with_capacity(rest.len() / 3);
    for token in rest.split_whitespace() {
        let byte = u8::from_str_radix(token, 16)
            .map_err(|_| TextParseError::InvalidHex(token.to_string()))?;
        bytes.push(byte);
    }
    if bytes.is_empty() {
        return Err(TextParseError::MissingArgument(HEX_LINE_PREFIX));
    }

    match decode_frame(&bytes) {
        Ok((frame, used)) if used == bytes.len() => Ok(Some(frame)),
        Ok((_, used)) => Err(hex_frame_error(
            crate::FramingFault::TrailingBytes(bytes.len() - used).into(),
        )),
        Err(DecodeError::Incomplete { .. }) => {
            Err(hex_frame_error(crate::FramingFault::Truncated.into()))
        }
        Err(err) => Err(hex_frame_error(err)),
    }
}

fn hex_frame_error(err: DecodeError) -> TextParseError {
    TextParseError::HexFrame(Box::new(err))
}

/// Render raw frame bytes as `SCK 02 20 04 ..` with uppercase hex.
pub fn format_hex_line(packet: &[u8]) -> String {
    let mut line = String::with_capacity(HEX_LINE_PREFIX.len() + packet.len() * 3);
    line.push_str(HEX_LINE_PREFIX);
    for byte in packet {
        let _ = write!(line, " {byte:02X}");
    }
    line
}

/// Encode a frame straight to its hex line.
pub fn frame_to_hex_line(frame: &Frame) -> Result<String, EncodeError> {
    Ok(format_hex_line(&encode(frame)?))
}
