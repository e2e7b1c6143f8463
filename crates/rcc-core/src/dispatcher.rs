//! ---
//! rcc_section: "01-core-functionality"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Command dispatch from decoded requests to store operations."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use rcc_common::ControlConfig;
use rcc_sck::CommandId;
use strum::{Display, IntoStaticStr};
use tracing::debug;

use crate::controller::{ControllerStatus, StatusBoard};
use crate::store::{
    ConfigField, ConfigStore, FieldValue, IoField, IoSnapshot, IoStore, ValidationError,
};

/// Which UART a request arrived on. Each channel owns a disjoint command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Channel {
    Monitor,
    IoMimic,
}

/// Fixed reason strings carried in `ERR <reason>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorReason {
    UnknownField,
    BadValue,
    InvalidRange,
    UnknownCommand,
    MalformedRequest,
    ChecksumMismatch,
    UnsupportedVersion,
}

impl From<&ValidationError> for ErrorReason {
    fn from(err: &ValidationError) -> Self {
        match err {
            ValidationError::UnknownField(_) => ErrorReason::UnknownField,
            ValidationError::BadValue { .. } => ErrorReason::BadValue,
            ValidationError::InvalidRange { .. } => ErrorReason::InvalidRange,
        }
    }
}

/// A command after decoding, independent of the wire encoding it used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub channel: Channel,
    pub tid: Option<u8>,
    pub command: u16,
    pub payload: String,
}

impl Request {
    pub fn new(channel: Channel, command: impl Into<u16>, payload: impl Into<String>) -> Self {
        Self {
            channel,
            tid: None,
            command: command.into(),
            payload: payload.into(),
        }
    }

    pub fn with_tid(mut self, tid: u8) -> Self {
        self.tid = Some(tid);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ack { field: &'static str, value: FieldValue },
    Config(ControlConfig),
    Status(Arc<ControllerStatus>),
    Io(IoSnapshot),
    Error(ErrorReason),
}

impl Reply {
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

fn write_fields<I>(f: &mut fmt::Formatter<'_>, fields: I) -> fmt::Result
where
    I: IntoIterator<Item = (&'static str, FieldValue)>,
{
    for (idx, (key, value)) in fields.into_iter().enumerate() {
        if idx > 0 {
            f.write_str(",")?;
        }
        write!(f, "{key}={value}")?;
    }
    Ok(())
}

/// Text payload shared by legacy responses and Status frames.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ack { field, value } => write!(f, "ACK {field}={value}"),
            Reply::Config(config) => {
                f.write_str("CONFIG ")?;
                write_fields(
                    f,
                    ConfigField::ALL
                        .iter()
                        .map(|field| (field.key(), field.read(config))),
                )
            }
            Reply::Status(status) => write!(f, "STATUS {status}"),
            Reply::Io(io) => {
                f.write_str("IO ")?;
                write_fields(
                    f,
                    IoField::ALL.iter().map(|field| (field.key(), field.read(io))),
                )
            }
            Reply::Error(reason) => write!(f, "ERR {reason}"),
        }
    }
}

/// Everything a request may read or mutate.
pub struct DispatchContext<'a> {
    pub config: &'a mut ConfigStore,
    pub io: &'a mut IoStore,
    pub status: &'a StatusBoard,
}

fn split_assignment(payload: &str) -> Option<(&str, &str)> {
    let (key, value) = payload.trim().split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then_some((key, value.trim()))
}

fn rejected(err: ValidationError) -> Reply {
    debug!(error = %err, "request rejected");
    Reply::Error(ErrorReason::from(&err))
}

/// Map a request to its reply, applying at most one store mutation.
///
/// Mutations land before the reply is built, so an `ACK` reports the stored
/// value and a following `GET` observes it.
pub fn dispatch(ctx: &mut DispatchContext<'_>, request: &Request) -> Reply {
    debug!(
        channel = %request.channel,
        tid = ?request.tid,
        command = request.command,
        "dispatching request"
    );

    let command = CommandId::from_repr(request.command);
    match (request.channel, command) {
        (Channel::Monitor, Some(CommandId::SetConfig)) => {
            let Some((key, raw)) = split_assignment(&request.payload) else {
                return Reply::Error(ErrorReason::MalformedRequest);
            };
            match ctx.config.set_key(key, raw) {
                Ok((field, value)) => Reply::Ack {
                    field: field.key(),
                    value,
                },
                Err(err) => rejected(err),
            }
        }
        (Channel::Monitor, Some(CommandId::GetConfig)) => Reply::Config(ctx.config.get()),
        (Channel::Monitor, Some(CommandId::GetStatus)) => Reply::Status(ctx.status.latest()),
        (Channel::IoMimic, Some(CommandId::SetSensor)) => set_io(ctx, &request.payload, true),
        (Channel::IoMimic, Some(CommandId::SetInput)) => set_io(ctx, &request.payload, false),
        (Channel::IoMimic, Some(CommandId::GetIo)) => Reply::Io(ctx.io.get()),
        (
            Channel::Monitor,
            Some(CommandId::SetSensor | CommandId::SetInput | CommandId::GetIo),
        )
        | (
            Channel::IoMimic,
            Some(CommandId::SetConfig | CommandId::GetConfig | CommandId::GetStatus),
        )
        | (_, None) => Reply::Error(ErrorReason::UnknownCommand),
    }
}

fn set_io(ctx: &mut DispatchContext<'_>, payload: &str, sensor: bool) -> Reply {
    let Some((key, raw)) = split_assignment(payload) else {
        return Reply::Error(ErrorReason::MalformedRequest);
    };
    let field = match key.parse::<IoField>() {
        Ok(field) if field.is_sensor() == sensor => field,
        _ => return rejected(ValidationError::UnknownField(key.to_string())),
    };
    match ctx.io.set(field, raw) {
        Ok(value) => Reply::Ack {
            field: field.key(),
            value,
        },
        Err(err) => rejected(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerState;

    struct Fixture {
        config: ConfigStore,
        io: IoStore,
        status: StatusBoard,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                config: ConfigStore::default(),
                io: IoStore::default(),
                status: StatusBoard::default(),
            }
        }

        fn send(&mut self, channel: Channel, command: CommandId, payload: &str) -> String {
            let mut ctx = DispatchContext {
                config: &mut self.config,
                io: &mut self.io,
                status: &self.status,
            };
            dispatch(&mut ctx, &Request::new(channel, command, payload)).to_string()
        }
    }

    #[test]
    fn set_then_get_config_reads_own_write() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.send(Channel::Monitor, CommandId::SetConfig, "target_temp_c=3.5"),
            "ACK target_temp_c=3.5"
        );
        assert_eq!(
            fx.send(Channel::Monitor, CommandId::GetConfig, ""),
            "CONFIG target_temp_c=3.5,compressor_min_off_s=120,defrost_interval_s=21600,defrost_duration_s=1200"
        );
    }

    #[test]
    fn config_errors_map_to_reasons() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.send(Channel::Monitor, CommandId::SetConfig, "fan_speed=3"),
            "ERR unknown_field"
        );
        assert_eq!(
            fx.send(Channel::Monitor, CommandId::SetConfig, "target_temp_c=cold"),
            "ERR bad_value"
        );
        assert_eq!(
            fx.send(Channel::Monitor, CommandId::SetConfig, "defrost_duration_s=30000"),
            "ERR invalid_range"
        );
        assert_eq!(
            fx.send(Channel::Monitor, CommandId::SetConfig, "target_temp_c"),
            "ERR malformed_request"
        );
        assert_eq!(fx.config.get(), ControlConfig::default());
    }

    #[test]
    fn io_channel_commands() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.send(Channel::IoMimic, CommandId::SetSensor, "air_temp_c=-1.25"),
            "ACK air_temp_c=-1.25"
        );
        assert_eq!(
            fx.send(Channel::IoMimic, CommandId::SetInput, "door_open=1"),
            "ACK door_open=1"
        );
        assert_eq!(
            fx.send(Channel::IoMimic, CommandId::GetIo, ""),
            "IO air_temp_c=-1.25,door_open=1,power_ok=1,motion_detected=0,panic_button_pressed=0"
        );
    }

    #[test]
    fn sensor_and_input_keys_do_not_cross() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.send(Channel::IoMimic, CommandId::SetSensor, "door_open=1"),
            "ERR unknown_field"
        );
        assert_eq!(
            fx.send(Channel::IoMimic, CommandId::SetInput, "air_temp_c=4.0"),
            "ERR unknown_field"
        );
        assert_eq!(
            fx.send(Channel::IoMimic, CommandId::SetInput, "power_ok=yes"),
            "ERR bad_value"
        );
        assert_eq!(fx.io.get(), IoSnapshot::default());
    }

    #[test]
    fn commands_are_bound_to_their_channel() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.send(Channel::IoMimic, CommandId::GetStatus, ""),
            "ERR unknown_command"
        );
        assert_eq!(
            fx.send(Channel::Monitor, CommandId::GetIo, ""),
            "ERR unknown_command"
        );

        let mut ctx = DispatchContext {
            config: &mut fx.config,
            io: &mut fx.io,
            status: &fx.status,
        };
        let reply = dispatch(&mut ctx, &Request::new(Channel::Monitor, 0x0042u16, ""));
        assert_eq!(reply, Reply::Error(ErrorReason::UnknownCommand));
    }

    #[test]
    fn status_reads_the_published_snapshot() {
        let mut fx = Fixture::new();
        fx.status.publish(ControllerStatus {
            state: ControllerState::Cooling,
            compressor_on: true,
            seconds_in_state: 5,
            ..ControllerStatus::default()
        });
        let first = fx.send(Channel::Monitor, CommandId::GetStatus, "");
        let second = fx.send(Channel::Monitor, CommandId::GetStatus, "");
        assert_eq!(first, second);
        assert!(first.starts_with("STATUS state=cooling,compressor_on=1,"));
    }
}
