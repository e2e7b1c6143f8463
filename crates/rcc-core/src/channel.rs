//! ---
//! rcc_section: "02-messaging-ipc-data-model"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Per-UART channel driver: decode, dispatch, reply."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
use std::sync::Arc;

use rcc_sck::{
    encode, format_hex_line, DecodeError, Decoded, Frame, FrameDecoder, FrameEncoding, Role,
    TextParseError,
};
use rcc_transport::{Transport, TransportError};
use tracing::{debug, trace, warn};

use crate::controller::ControllerStatus;
use crate::dispatcher::{dispatch, Channel, DispatchContext, ErrorReason, Reply, Request};

/// Running counters for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub requests: u64,
    pub ignored: u64,
    pub decode_errors: u64,
}

/// Owns one UART and its decoder.
///
/// Replies mirror the request encoding: binary frames are answered with
/// binary Status frames, hex lines with hex lines, legacy text with plain
/// text lines.
#[derive(Debug)]
pub struct ChannelDriver<T> {
    channel: Channel,
    transport: T,
    decoder: FrameDecoder,
    stats: ChannelStats,
}

impl<T: Transport> ChannelDriver<T> {
    pub fn new(channel: Channel, transport: T, stall_limit: u32) -> Self {
        Self {
            channel,
            transport,
            decoder: FrameDecoder::with_stall_limit(stall_limit),
            stats: ChannelStats::default(),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Drain whatever the UART has buffered and answer every complete request.
    /// Returns the number of requests dispatched.
    pub fn poll(&mut self, ctx: &mut DispatchContext<'_>) -> Result<usize, TransportError> {
        let bytes = self.transport.try_read()?;
        if !bytes.is_empty() {
            trace!(channel = %self.channel, len = bytes.len(), "bytes received");
        }
        self.decoder.extend(&bytes);

        let mut handled = 0;
        while let Some(item) = self.decoder.next_item() {
            match item {
                Ok(Decoded::Frame { frame, encoding }) => {
                    if frame.role == Role::Status {
                        debug!(channel = %self.channel, tid = frame.tid, "ignoring status frame");
                        self.stats.ignored += 1;
                        continue;
                    }
                    let request = Request::new(
                        self.channel,
                        frame.command,
                        frame.payload_text().into_owned(),
                    )
                    .with_tid(frame.tid);
                    let reply = dispatch(ctx, &request);
                    self.send_frame(&frame.reply(reply.to_string()), encoding)?;
                    handled += 1;
                }
                Ok(Decoded::Text(command)) => {
                    let request =
                        Request::new(self.channel, command.command_id(), command.payload());
                    let reply = dispatch(ctx, &request);
                    self.send_line(&reply.to_string())?;
                    handled += 1;
                }
                Ok(Decoded::Ignored(kind)) => {
                    trace!(channel = %self.channel, ?kind, "input ignored");
                    self.stats.ignored += 1;
                }
                Err(err) => {
                    self.stats.decode_errors += 1;
                    self.report_decode_error(&err)?;
                }
            }
        }
        self.stats.requests += handled as u64;
        Ok(handled)
    }

    /// Send an unsolicited `STATUS` line.
    pub fn announce(&self, status: &ControllerStatus) -> Result<(), TransportError> {
        self.send_line(&Reply::Status(Arc::new(status.clone())).to_string())
    }

    fn report_decode_error(&self, err: &DecodeError) -> Result<(), TransportError> {
        if let Some(correlation) = err.correlation() {
            let reason = frame_error_reason(err);
            warn!(
                channel = %self.channel,
                tid = correlation.tid,
                command = correlation.command,
                reason = %reason,
                error = %err,
                "rejecting frame"
            );
            let reply = Frame::new_status(
                correlation.tid,
                correlation.command,
                Reply::Error(reason).to_string(),
            );
            return self.send_frame(&reply, correlation.encoding);
        }

        match err {
            DecodeError::TextParse(parse) => {
                let reason = text_error_reason(parse);
                warn!(channel = %self.channel, reason = %reason, error = %err, "rejecting line");
                self.send_line(&Reply::Error(reason).to_string())
            }
            _ => {
                warn!(channel = %self.channel, error = %err, "dropping malformed input");
                Ok(())
            }
        }
    }

    fn send_frame(&self, frame: &Frame, encoding: FrameEncoding) -> Result<(), TransportError> {
        let bytes = match encode(frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(channel = %self.channel, tid = frame.tid, error = %err, "reply not encodable");
                return Ok(());
            }
        };
        debug!(
            channel = %self.channel,
            tid = frame.tid,
            command = frame.command,
            ?encoding,
            "sending status frame"
        );
        match encoding {
            FrameEncoding::Binary => self.transport.write(&bytes),
            FrameEncoding::HexLine => self.send_line(&format_hex_line(&bytes)),
        }
    }

    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.transport.write(&bytes)
    }
}

fn frame_error_reason(err: &DecodeError) -> ErrorReason {
    match err {
        DecodeError::Checksum { .. } => ErrorReason::ChecksumMismatch,
        DecodeError::UnsupportedVersion { .. } => ErrorReason::UnsupportedVersion,
        DecodeError::TextParse(TextParseError::HexFrame(inner)) => frame_error_reason(inner),
        _ => ErrorReason::MalformedRequest,
    }
}

fn text_error_reason(err: &TextParseError) -> ErrorReason {
    match err {
        TextParseError::UnknownVerb(_) | TextParseError::UnknownTarget(_) => {
            ErrorReason::UnknownCommand
        }
        TextParseError::NotUtf8
        | TextParseError::MissingArgument(_)
        | TextParseError::LineTooLong(_)
        | TextParseError::InvalidHex(_)
        | TextParseError::HexFrame(_) => ErrorReason::MalformedRequest,
    }
}
